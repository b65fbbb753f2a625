use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use gw_data_fetch::config::{JobLoader, SearchTableLoader};
use gw_data_fetch::error::GwError;

fn temp_path(temp: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join(name)).unwrap()
}

#[test]
fn job_file_accepts_utc_strings() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp_path(&temp, "jobspec.json");
    fs::write(
        &path,
        r#"{
            "start": "2017-01-01T00:00:00Z",
            "end": 1167264078,
            "channels": ["H1:SYS-TIMING_C_MA_A_PORT_2_SLAVE_CFC_TIMEDIFF_2"],
            "extensions": ["csv"],
            "max_chunk_length": 3600
        }"#,
    )
    .unwrap();

    let job = JobLoader::resolve(Some(&path), Utf8Path::new("dump")).unwrap();
    assert_eq!(job.start, 1_167_264_018);
    assert_eq!(job.end, 1_167_264_078);
    assert_eq!(job.exts, vec!["csv".to_string()]);
    assert_eq!(job.max_chunk_length, 3600);
    assert_eq!(job.outdir, Utf8PathBuf::from("dump"));
}

#[test]
fn job_file_rejects_unknown_extension() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp_path(&temp, "jobspec.json");
    fs::write(
        &path,
        r#"{"start": 0, "end": 60, "channels": ["H1:X"], "exts": ["hdf5"]}"#,
    )
    .unwrap();
    assert_matches!(
        JobLoader::resolve(Some(&path), Utf8Path::new(".")),
        Err(GwError::InvalidJob(_))
    );
}

#[test]
fn missing_job_file_is_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp_path(&temp, "nope.json");
    assert_matches!(
        JobLoader::resolve(Some(&path), Utf8Path::new(".")),
        Err(GwError::JobRead(_))
    );
}

#[test]
fn search_table_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp_path(&temp, "search-table.json");
    fs::write(
        &path,
        r#"{
            "epochs": [{"name": "O3", "start": 1238166018, "end": 1269363618}],
            "directories": [{
                "epoch": "O3",
                "frametype": "H1_R",
                "server": "ldas-grid.example.org",
                "path": "/archive/O3/raw/H1"
            }]
        }"#,
    )
    .unwrap();

    let table = SearchTableLoader::resolve(Some(&path)).unwrap();
    assert_eq!(table.epoch_for(1_238_166_018), Some("O3"));
    assert_eq!(table.epoch_for(1_269_363_618), None);
    assert_eq!(
        table.directory("O3", "H1_R", "ldas-grid.example.org"),
        Some("/archive/O3/raw/H1")
    );
}

#[test]
fn explicit_search_table_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp_path(&temp, "missing.json");
    assert_matches!(
        SearchTableLoader::resolve(Some(&path)),
        Err(GwError::SearchTableRead(_))
    );
}

#[test]
fn malformed_search_table_is_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp_path(&temp, "broken.json");
    fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        SearchTableLoader::resolve(Some(&path)),
        Err(GwError::SearchTableParse(_))
    );
}
