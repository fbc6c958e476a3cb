use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_summary, OutputFormat};

#[derive(Serialize)]
struct VersionOutput {
    schema_id: &'static str,
    name: &'static str,
    version: &'static str,
    target: &'static str,
    rustc: &'static str,
    git_hash: &'static str,
    worker_thread: &'static str,
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("shmframe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let out = VersionOutput {
        schema_id: "shmframe/cli/v1/version",
        name: "shmframe",
        version: env!("CARGO_PKG_VERSION"),
        target: option_env!("SHMFRAME_BUILD_TARGET").unwrap_or("unknown"),
        rustc: option_env!("RUSTC_VERSION").unwrap_or("unknown"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        worker_thread: shmframe::receiver::WORKER_THREAD_NAME,
    };
    print_summary(
        &out,
        &[
            ("name", out.name.to_string()),
            ("version", out.version.to_string()),
            ("target", out.target.to_string()),
            ("target_os", std::env::consts::OS.to_string()),
            ("rustc", out.rustc.to_string()),
            ("git_hash", out.git_hash.to_string()),
            ("worker_thread", out.worker_thread.to_string()),
        ],
        format,
    );

    Ok(SUCCESS)
}
