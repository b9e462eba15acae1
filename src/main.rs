fn main() {
    if let Err(err) = specbench::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
