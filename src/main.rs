fn main() -> std::process::ExitCode {
    seat_contention_lib::run()
}
