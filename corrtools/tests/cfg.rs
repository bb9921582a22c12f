use corrtools::cfg::Settings;
use std::time::Duration;

#[test]
fn default_acquisition_values() {
    let settings = Settings::default();
    assert_eq!(settings.count_length, 50);
    assert_eq!(settings.bin_width, 500);
    assert_eq!(settings.refresh_interval, Duration::from_millis(1000));
    assert!(!settings.saving);
}

#[test]
fn settings_file_round_trip() {
    let path = std::env::temp_dir().join(format!("corrtools-cfg-{}.json", std::process::id()));
    let settings = Settings {
        count_length: 120,
        bin_width: 1500,
        refresh_interval: Duration::from_millis(250),
        saving: true,
    };
    settings.store(&path).unwrap();
    let restored = Settings::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(settings, restored);
}

/// The on-disk format is stable: plain JSON with a humantime refresh interval.
#[test]
fn settings_parse_from_handwritten_json() {
    let settings: Settings = serde_json::from_str(
        r#"{
            "count_length": 25,
            "bin_width": 1000,
            "refresh_interval": "250ms",
            "saving": false
        }"#,
    )
    .unwrap();
    assert_eq!(settings.count_length, 25);
    assert_eq!(settings.bin_width, 1000);
    assert_eq!(settings.refresh_interval, Duration::from_millis(250));
}

#[test]
fn load_missing_file_fails() {
    assert!(Settings::load(std::path::Path::new("does-not-exist.json")).is_err());
}
