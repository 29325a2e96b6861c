fn main() {
    if let Err(err) = gp_joule_sync::app::run_api() {
        eprintln!("api startup failed: {err}");
        std::process::exit(1);
    }
}
