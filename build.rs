use std::path::PathBuf;
use std::{env, fs};

/// Build the C test fixture as a shared library when a C compiler is available.
/// Tests that need it read `RELAXNATIVE_FIXTURE_LIB` and skip when it is unset.
fn main() {
    let source = PathBuf::from("tests/fixtures/native_fixture.c");
    println!("cargo:rerun-if-changed={}", source.display());
    println!("cargo:rerun-if-env-changed=CC");

    let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from) else {
        return;
    };
    let target = env::var("TARGET").unwrap_or_default();
    let file_name = if target.contains("apple") {
        "libnative_fixture.dylib"
    } else if target.contains("windows") {
        "native_fixture.dll"
    } else {
        "libnative_fixture.so"
    };
    let output = out_dir.join(file_name);

    let compiler = match cc::Build::new().cargo_metadata(false).try_get_compiler() {
        Ok(compiler) => compiler,
        Err(e) => {
            println!("cargo:warning=native fixture skipped: {e}");
            return;
        }
    };

    let mut command = compiler.to_command();
    if compiler.is_like_msvc() {
        command.arg("/LD").arg(&source).arg(format!("/Fe{}", output.display()));
    } else {
        command.args(["-shared", "-fPIC", "-O1", "-o"]).arg(&output).arg(&source);
    }

    match command.status() {
        Ok(status) if status.success() && fs::metadata(&output).is_ok() => {
            println!("cargo:rustc-env=RELAXNATIVE_FIXTURE_LIB={}", output.display());
        }
        Ok(status) => println!("cargo:warning=native fixture build failed ({status})"),
        Err(e) => println!("cargo:warning=native fixture compiler unavailable: {e}"),
    }
}
