//! Records build metadata for `streamux version --extended`.

const FORWARDED: [(&str, &str); 3] = [
    ("TARGET", "STREAMUX_BUILD_TARGET"),
    ("PROFILE", "STREAMUX_BUILD_PROFILE"),
    ("STREAMUX_GIT_HASH", "STREAMUX_GIT_HASH"),
];

fn main() {
    for (source, exported) in FORWARDED {
        if let Ok(value) = std::env::var(source) {
            println!("cargo:rustc-env={exported}={value}");
        }
        println!("cargo:rerun-if-env-changed={source}");
    }
}
