use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("macrodyne {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: macrodyne");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", target_triple());
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: async={}, cli=true", cfg!(feature = "async"));
    println!("protocols: 1690M, 1690G");

    Ok(SUCCESS)
}

fn target_triple() -> String {
    if let Some(target) = option_env!("MACRODYNE_BUILD_TARGET") {
        return target.to_string();
    }
    format!("{}-unknown-{}", std::env::consts::ARCH, std::env::consts::OS)
}
