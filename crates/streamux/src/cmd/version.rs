use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("streamux {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: streamux");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("STREAMUX_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("STREAMUX_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("STREAMUX_GIT_HASH").unwrap_or("unknown"));
    println!(
        "wire: header={}B frame_header={}B max_datagram={}B",
        streamux_frame::HEADER_SIZE,
        streamux_frame::FRAME_HEADER_SIZE,
        streamux_frame::DEFAULT_MAX_DATAGRAM
    );
    println!("features: conn={}, cli=true", cfg!(feature = "conn"));

    Ok(SUCCESS)
}
