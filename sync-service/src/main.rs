fn main() {
    if let Err(err) = gp_joule_sync::app::run_service() {
        eprintln!("service startup failed: {err}");
        std::process::exit(1);
    }
}
