fn main() -> std::process::ExitCode {
    lyric_scan_lib::run()
}
