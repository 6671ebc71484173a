#[cfg(test)]
mod tests {
    use std::process::Command;

    // The binary crate has no lib target, so these drive the compiled executable.
    fn rustymoods() -> Command {
        Command::new(env!("CARGO_BIN_EXE_rustymoods"))
    }

    #[test]
    fn missing_video_fails_before_anything_else() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("uploads/data.json");
        let config = dir.path().join("config.json");

        let out = rustymoods()
            .current_dir(dir.path())
            .args(["--video", "does_not_exist.mp4", "--headless", "--simulate"])
            .arg("--data")
            .arg(&data)
            .arg("--config")
            .arg(&config)
            .output()
            .unwrap();

        assert!(!out.status.success());
        let stderr = String::from_utf8_lossy(&out.stderr);
        assert!(stderr.contains("not found"), "stderr: {}", stderr);
        // nothing was prepared
        assert!(!dir.path().join("uploads").exists());
        assert!(!config.exists());
    }

    #[test]
    fn rejects_zero_sized_display() {
        let out = rustymoods().args(["--width", "0"]).output().unwrap();
        assert!(!out.status.success());
    }

    #[test]
    fn shipped_config_is_valid() {
        let config: serde_json::Value = serde_json::from_str(include_str!("../config.json")).unwrap();
        let labels = config["models"]["emotion_labels"].as_array().unwrap();
        assert_eq!(labels.len(), 8);
        assert!(config["ui"]["plot_size"].as_u64().unwrap() >= 64);
    }
}
