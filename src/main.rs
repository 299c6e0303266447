use std::process::ExitCode;

use colcon_ros_cargo::{cli, log};

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli::command().get_matches();
    log::init(matches.get_flag("verbose"));

    match cli::run(&matches).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
