fn main() {
    if let Err(err) = aptvote_lib::run() {
        eprintln!("aptvote: {err:#}");
        std::process::exit(1);
    }
}
