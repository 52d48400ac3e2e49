//! Argument parsing and help text for the `decoyd` binary. Thin by
//! design — the core engine does not know this module exists.

pub fn print_help() {
    println!("decoyd {}", env!("CARGO_PKG_VERSION"));
    println!("A low-to-medium interaction TCP honeypot.\n");
    print_usage();
}

fn print_usage() {
    println!("USAGE:");
    println!("  decoyd [serve]                   Run the acceptor until interrupted (default)");
    println!("  decoyd sessions [--last N]        One line per captured session");
    println!("  decoyd show <session-id>          Full event log and payload manifest for one session");
    println!("  decoyd doctor                     Check sessions root, bind address, model artifact, disk space");
    println!("  decoyd generate-instance-id        Print a fresh random instance label");
    println!("  decoyd help | --help | -h          Show this help");
    println!("  decoyd --version | -V              Print the version\n");
    println!("ENVIRONMENT:");
    println!("  HONEYPOT_HOST              Bind host (default 127.0.0.1)");
    println!("  HONEYPOT_PORT              Bind port (default 2222)");
    println!("  HONEYPOT_SESSIONS_DIR      Evidence root (default ~/.decoyd/sessions)");
    println!("  HONEYPOT_INSTANCE          Node label embedded in every session (default: hostname)");
    println!("  HONEYPOT_MODEL_PATH        Trained classifier artifact (default ~/.decoyd/model.json)");
}

pub fn get_flag(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_flag_returns_following_value() {
        let args = vec!["--last".to_string(), "5".to_string()];
        assert_eq!(get_flag(&args, "--last"), Some("5".to_string()));
    }

    #[test]
    fn get_flag_missing_is_none() {
        let args = vec!["sessions".to_string()];
        assert_eq!(get_flag(&args, "--last"), None);
    }
}
