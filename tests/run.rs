//! Integration tests for the `run` command.
use psha::cli::{RunOpts, handle_run_command};
use psha::settings::Settings;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Get the path to the example job.
fn get_job_dir() -> PathBuf {
    PathBuf::from("demos/simple")
}

fn run(output_dir: &Path, overwrite: bool) -> anyhow::Result<()> {
    let opts = RunOpts {
        output_dir: Some(output_dir.to_path_buf()),
        overwrite,
        pool_size: Some(2),
        concurrent_tasks: Some(4),
    };
    handle_run_command(&get_job_dir(), &opts, Some(Settings::default()))
}

/// An integration test for the `run` command.
#[test]
fn test_handle_run_command() {
    unsafe { std::env::set_var("PSHA_LOG_LEVEL", "off") };

    // Save results to non-existent directory to check that directory creation works
    let tempdir = tempdir().unwrap();
    let output_dir = tempdir.path().join("results");
    run(&output_dir, false).unwrap();

    for file_name in [
        "hazard_curves.csv",
        "mean_hazard_curves.csv",
        "quantile_hazard_curves.csv",
        "hazard_maps.csv",
        "metadata.toml",
    ] {
        assert!(
            output_dir.join(file_name).is_file(),
            "Missing output file {file_name}"
        );
    }

    // Two quantiles, two IMTs with 8 and 9 levels, four sites
    let quantiles = fs::read_to_string(output_dir.join("quantile_hazard_curves.csv")).unwrap();
    assert_eq!(quantiles.lines().count(), 1 + 2 * (8 + 9) * 4);

    // Output directory is no longer empty
    assert!(run(&output_dir, false).is_err());

    // ...unless we overwrite it
    run(&output_dir, true).unwrap();
}
