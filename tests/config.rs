use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use bids_curator::app::{CurateOptions, Curator};
use bids_curator::config::ConfigLoader;
use bids_curator::error::CurateError;
use bids_curator::materialize::NopProducer;

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

fn write_file(path: &Utf8Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
    fs::write(path.as_std_path(), content).unwrap();
}

const MPM_CONFIG: &str = r#"{
    "name": "mpm-demo",
    "match_mode": "substring",
    "images": [
        {
            "pattern": "mpm_t1w",
            "suffix": "acq-mpm_T1w.nii.gz",
            "modality": "anat",
            "copy_sidecar": true
        }
    ],
    "resolver": {"strategy": "path-segment", "index": 0}
}"#;

#[test]
fn json_config_drives_a_run_and_copies_source_sidecars() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8(temp.path());
    let config_path = root.join("mpm.json");
    fs::write(config_path.as_std_path(), MPM_CONFIG).unwrap();

    let input = root.join("input");
    let output = root.join("output");
    write_file(&input.join("042/mpm_t1w_scan.nii.gz"), b"voxels");
    // scanner-exported sidecar, Latin-1 encoded u-umlaut
    write_file(
        &input.join("042/mpm_t1w_scan.json"),
        b"{\"InstitutionName\": \"Z\xfcrich\"}",
    );

    let dataset = ConfigLoader::resolve(&config_path).unwrap();
    let report = Curator::new(dataset, NopProducer)
        .run(&input, &output, &CurateOptions::default())
        .unwrap();
    assert_eq!(report.files_copied, 1);
    assert_eq!(report.sidecars_created, 1);

    let sidecar = fs::read_to_string(
        output
            .join("sub-042/anat/sub-042_acq-mpm_T1w.json")
            .as_std_path(),
    )
    .unwrap();
    assert!(sidecar.contains("Zürich"));
}

#[test]
fn missing_config_file_is_a_config_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = utf8(temp.path()).join("absent.json");
    let err = ConfigLoader::resolve(&path).unwrap_err();
    assert_matches!(err, CurateError::ConfigRead(_));
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = utf8(temp.path()).join("broken.json");
    fs::write(path.as_std_path(), b"{\"name\": ").unwrap();
    let err = ConfigLoader::resolve(&path).unwrap_err();
    assert_matches!(err, CurateError::ConfigParse(_));
}
