use std::env;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=NTT_CUDA_ARCH");

    if env::var_os("CARGO_FEATURE_GPU").is_none() {
        return Ok(());
    }

    let cuda_lib_dir = "../ntt-gpu";
    let arch = env::var("NTT_CUDA_ARCH").unwrap_or_else(|_| "sm_80".to_string());

    cc::Build::new()
        .cuda(true)
        .cudart("static")
        .include(cuda_lib_dir)
        .files(&[
            format!("{}/ntt.cu", cuda_lib_dir),
            format!("{}/utils.cu", cuda_lib_dir),
        ])
        .flag(&format!("-arch={}", arch))
        .warnings(false)
        .extra_warnings(false)
        .compile("ntt_gpu_stark");

    println!("cargo:rustc-link-lib=cudart");
    println!("cargo:rerun-if-changed={}", cuda_lib_dir);

    Ok(())
}
