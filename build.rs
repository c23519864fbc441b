use std::env;
use std::process::Command;

/// Run the configured interpreter and return its trimmed stdout.
fn query(python: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(python).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    Some(text).filter(|text| !text.is_empty() && text != "None")
}

fn main() {
    // PyO3's build script selects and links the interpreter. Embedding hosts
    // also need libpython on the linker search path and, on Linux, on the
    // runtime path, so test binaries start without LD_LIBRARY_PATH.
    println!("cargo:rerun-if-env-changed=PYO3_PYTHON");
    let python = env::var("PYO3_PYTHON").unwrap_or_else(|_| "python3".to_owned());

    if let Some(version) = query(&python, &["--version"]) {
        println!("cargo:warning=rupy embeds {version} ({python})");
    }

    let libdir = query(
        &python,
        &["-c", "import sysconfig; print(sysconfig.get_config_var('LIBDIR'))"],
    );
    if let Some(libdir) = libdir {
        println!("cargo:rustc-link-search=native={libdir}");
        if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("linux") {
            println!("cargo:rustc-link-arg=-Wl,-rpath,{libdir}");
        }
    }
}
