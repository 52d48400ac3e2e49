use anyhow::Result;
use decoyd::acceptor;
use decoyd::classifier::Classifier;
use decoyd::cli;
use decoyd::config::Config;
use decoyd::doctor;
use decoyd::engagement::EngagementLimits;
use decoyd::session::SessionManager;
use decoyd::view;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();

    if raw_args.iter().any(|a| a == "--no-color") {
        view::disable_color();
    }
    let args: Vec<String> = raw_args.into_iter().filter(|a| a != "--no-color").collect();

    if args.iter().any(|a| a == "--help" || a == "-h") || args.first().map(|s| s.as_str()) == Some("help") {
        cli::print_help();
        return Ok(());
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("decoyd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    match args.first().map(|s| s.as_str()) {
        None => {
            if atty::is(atty::Stream::Stdin) {
                eprintln!("decoyd: refusing to serve with stdin attached to a terminal.");
                eprintln!("Did you mean 'decoyd help'?");
                std::process::exit(1);
            }
            serve().await
        }
        Some("serve") => serve().await,
        Some("sessions") => dispatch_sessions(&args[1..]),
        Some("show") => dispatch_show(&args[1..]),
        Some("doctor") => {
            doctor::run(&Config::load());
            Ok(())
        }
        Some("generate-instance-id") => {
            println!("{}", uuid::Uuid::new_v4());
            Ok(())
        }
        Some(other) => {
            eprintln!("decoyd: unknown command '{other}'\n");
            eprintln!("Run 'decoyd help' for usage.");
            std::process::exit(1);
        }
    }
}

async fn serve() -> Result<()> {
    let config = Config::load();
    eprintln!("[decoyd] instance={}", config.instance);
    eprintln!("[decoyd] sessions_dir={}", config.sessions_dir.display());

    std::fs::create_dir_all(&config.sessions_dir)?;
    let sessions = Arc::new(SessionManager::new(
        config.sessions_dir.clone(),
        config.instance.clone(),
    ));
    let classifier = Arc::new(Classifier::load(&config.model_path));
    let limits = EngagementLimits::default();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("[decoyd] interrupt received, stopping acceptor");
            let _ = shutdown_tx.send(true);
        }
    });

    acceptor::serve(&config.bind_addr(), sessions, classifier, limits, shutdown_rx).await
}

fn dispatch_sessions(args: &[String]) -> Result<()> {
    let config = Config::load();
    let last = cli::get_flag(args, "--last").and_then(|s| s.parse().ok());
    view::sessions(&config.sessions_dir, last)
}

fn dispatch_show(args: &[String]) -> Result<()> {
    let config = Config::load();
    let session_id = args
        .first()
        .ok_or_else(|| anyhow::anyhow!("usage: decoyd show <session-id>"))?;
    view::show(&config.sessions_dir, session_id)
}
