use std::process::ExitCode;

fn main() -> ExitCode {
    match dummydevd::run_plugin() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            dummydevd::report_launch_failure(&error);
            ExitCode::FAILURE
        }
    }
}
