mod commands;
mod config;
mod handlers;
mod printer;

use commands::{Command, HELP};
use handlers::{DemoHandlers, Readout};
use mkhook_core::{
    lock_dispatcher, AppInputPort, ButtonAction, Dispatcher, RawEventKind, ScopeManager,
    SuppressibleKind,
};
use mkhook_platform::PlatformSourceFactory;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mkhook=info,mkhook_core=info,mkhook_platform=info".into()),
        )
        .try_init();
}

/// Everything a command may touch.
struct Session {
    manager: ScopeManager,
    handlers: DemoHandlers,
    app_port: AppInputPort,
    readout: Arc<Readout>,
}

impl Session {
    fn run(&mut self, command: Command) {
        match command {
            Command::Scope(scope) => match self.manager.set_scope(scope) {
                Ok(()) => println!("scope: {}", self.manager.scope()),
                Err(e) => {
                    warn!(error = %e, "Scope change failed");
                    println!("scope change failed: {e} (scope is {})", self.manager.scope());
                }
            },
            Command::SuppressMouse(on) => {
                self.set_suppression(&[SuppressibleKind::MouseDown], on);
            }
            Command::SuppressWheel(on) => {
                self.set_suppression(&[SuppressibleKind::MouseWheel, SuppressibleKind::MouseHWheel], on);
            }
            Command::AppClick { x, y, button } => {
                for action in [ButtonAction::Down, ButtonAction::Up] {
                    let verdict = self.app_port.push(RawEventKind::MouseButton {
                        button,
                        action,
                        x,
                        y,
                    });
                    info!(?button, ?action, ?verdict, "Application click delivered");
                }
            }
            Command::Status => self.print_status(),
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }

    fn set_suppression(&mut self, kinds: &[SuppressibleKind], on: bool) {
        let dispatcher = self.manager.dispatcher();
        let mut dispatcher = lock_dispatcher(&dispatcher);
        for &kind in kinds {
            self.handlers.set_suppression(&mut dispatcher, kind, on);
        }
        if on && !mkhook_platform::can_suppress() {
            println!("note: the global source on this platform only observes; verdicts apply to the app port");
        }
    }

    fn print_status(&self) {
        let dispatcher = self.manager.dispatcher();
        let policy = lock_dispatcher(&dispatcher).suppression_policy();
        println!(
            "scope: {} (active: {})  suppress mouse: {}  suppress wheel: {}/{}",
            self.manager.scope(),
            self.manager.is_active(),
            policy.mouse_down,
            policy.mouse_wheel,
            policy.mouse_hwheel,
        );
        println!("{}", self.readout.summary());
    }
}

fn main() {
    init_logging();

    let config = config::load(std::env::args().nth(1).map(PathBuf::from));
    let (lines, printer) = printer::spawn(config.log_format);

    let readout = Arc::new(Readout::default());
    let handlers = DemoHandlers::new(lines.clone(), readout.clone());
    let dispatcher = Arc::new(Mutex::new(Dispatcher::new(
        config.gesture.clone(),
        config.suppression,
    )));
    handlers.subscribe(&mut lock_dispatcher(&dispatcher));

    let factory = PlatformSourceFactory::new();
    let app_port = factory.app_port();
    let manager = ScopeManager::new(Box::new(factory), dispatcher);

    let mut session = Session {
        manager,
        handlers,
        app_port,
        readout,
    };
    session.run(Command::Scope(config.scope));
    println!("{HELP}");

    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => session.run(command),
            Err(e) => println!("{e}"),
        }
    }

    session.manager.teardown();
    let dropped = lines.dropped();
    // The printer exits once every sender, including those captured by
    // handlers, is gone.
    drop(session);
    drop(lines);
    if printer.join().is_err() {
        warn!("Printer thread panicked");
    }
    info!(dropped, "mkhook exiting");
}
