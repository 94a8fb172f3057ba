fn setup_environment() {
    std::env::remove_var("PYTHONHOME");
    std::env::remove_var("PYTHONPATH");
    std::env::set_var("PYTHONUTF8", "1");
}

fn main() -> std::process::ExitCode {
    setup_environment();
    waveget_lib::run()
}
