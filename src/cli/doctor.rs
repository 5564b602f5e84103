//! Environment readiness check.

use crate::driver::chromium::find_chromium;
use crate::storage::ArtifactStore;
use anyhow::Result;

/// Check Chromium availability and the capture directory.
pub async fn run() -> Result<()> {
    println!("Veriscope Doctor");
    println!("================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let chromium_path = find_chromium();
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set VERISCOPE_CHROMIUM_PATH."
        ),
    }

    let capture_dir = ArtifactStore::default_dir();
    match ArtifactStore::new(capture_dir.clone()) {
        Ok(_) => println!("[OK] Capture directory writable: {}", capture_dir.display()),
        Err(e) => println!("[!!] Capture directory unusable: {e:#}"),
    }

    println!();
    if chromium_path.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        println!("  Captures will fail until a Chromium binary is available.");
    }

    Ok(())
}
