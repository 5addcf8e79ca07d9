use std::env;

const PATH: &str = "src/asm";
const ASM_FILE: &str = "_context.S";
const LIB_NAME: &str = "ctxswtch";

fn main() {
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap();
    let file = match arch.as_str() {
        "x86_64" => format!("{}/x86_64/{}", PATH, ASM_FILE),
        "aarch64" => format!("{}/aarch64/{}", PATH, ASM_FILE),
        other => panic!("no context switch routine for target arch {}", other),
    };

    cc::Build::new().file(&file).compile(LIB_NAME);
    println!("cargo:rerun-if-changed={}", file);
}
