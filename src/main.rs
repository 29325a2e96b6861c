fn main() {
    if let Err(err) = gp_joule_sync::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
