use std::process::ExitCode;

fn main() -> ExitCode {
    match sqlmemo::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("sqlmemo: {err:#}");
            ExitCode::FAILURE
        }
    }
}
