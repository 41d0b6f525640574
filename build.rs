//! This build script prepares the firmware build. Host builds of the library and its tests skip all of it.
//!
//! It copies the `memory.x` file from the crate root into a directory where the linker can always find it, and
//! turns the site configuration in `config/` into Rust constants: the wifi credentials and the time API url.
//! Missing configuration files are created with dummy values so a fresh checkout builds.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::print_stdout)]

use std::{
    env, fs,
    fs::File,
    io,
    io::Write,
    path::{Path, PathBuf},
};

fn main() {
    // only the firmware binary needs any of this
    if env::var_os("CARGO_FEATURE_RP2040").is_none() {
        return;
    }
    memory_x();
    wifi_secrets().unwrap();
    time_api_config().unwrap();
}

/// Read a configuration file from `config/`, or create it from `dummy` if it doesn't exist
fn read_config(file_name: &str, dummy: &str) -> serde_json::Value {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR environment variable not set");
    let config_dir = Path::new(&manifest_dir).join("config");
    let config_path = config_dir.join(file_name);
    println!("cargo:rerun-if-changed={}", config_path.display());

    let config_contents = if config_path.exists() {
        fs::read_to_string(&config_path).expect("Could not read configuration file")
    } else {
        println!("cargo:warning={file_name} not found, creating it with dummy values");
        fs::create_dir_all(&config_dir).expect("Could not create config directory");
        fs::write(&config_path, dummy).expect("Could not write dummy configuration file");
        dummy.to_string()
    };
    serde_json::from_str(&config_contents).expect("Could not parse configuration file")
}

/// Generate `wifi_secrets.rs` from `wifi_config.json`
fn wifi_secrets() -> io::Result<()> {
    let config = read_config("wifi_config.json", r#"{"ssid":"dummy","password":"dummy"}"#);
    let ssid = config["ssid"]
        .as_str()
        .expect("ssid not found in wifi_config.json file");
    let password = config["password"]
        .as_str()
        .expect("password not found in wifi_config.json file");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR environment variable not set");
    let mut f = File::create(Path::new(&out_dir).join("wifi_secrets.rs"))?;
    writeln!(f, "/// SSID of the wifi network to join")?;
    writeln!(f, "const SSID: &str = {ssid:?};")?;
    writeln!(f, "/// Password of the wifi network to join")?;
    writeln!(f, "const PASSWORD: &str = {password:?};")?;
    Ok(())
}

/// Generate `time_api_config.rs` from `time_api.json`
fn time_api_config() -> io::Result<()> {
    let config = read_config(
        "time_api.json",
        r#"{"time api by zone":{"baseurl":"http://worldtimeapi.org/api","timezone":"/timezone/Etc/UTC"}}"#,
    );
    let baseurl = config["time api by zone"]["baseurl"]
        .as_str()
        .expect("baseurl not found in time_api.json file");
    let timezone = config["time api by zone"]["timezone"]
        .as_str()
        .expect("timezone not found in time_api.json file");

    // Combine baseurl and timezone into a single string for TIME_SERVER_URL
    let combined_url = format!("{baseurl}{timezone}");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR environment variable not set");
    let mut f = File::create(Path::new(&out_dir).join("time_api_config.rs"))?;
    writeln!(f, "/// Url of the time API, zone included")?;
    writeln!(f, "const TIME_SERVER_URL: &str = {combined_url:?};")?;
    Ok(())
}

/// Handle the `memory.x` linker script
fn memory_x() {
    // Put `memory.x` in our output directory and ensure it's
    // on the linker search path.
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(include_bytes!("memory.x"))
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    // By specifying `memory.x` here, we ensure the build script is only re-run when
    // `memory.x` is changed.
    println!("cargo:rerun-if-changed=memory.x");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
