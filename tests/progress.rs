use camino::{Utf8Path, Utf8PathBuf};

use gw_data_fetch::frame::{DEFAULT_SERVER, FrameQuery};
use gw_data_fetch::progress::{FrameProgress, FrameStatus, classify, no_remote_found};
use gw_data_fetch::store::Store;

fn outdir(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

fn query_at(outdir: &Utf8Path, gpstime: i64) -> FrameQuery {
    FrameQuery::new("H", "H1_R", gpstime, 4096, DEFAULT_SERVER, outdir)
}

#[test]
fn query_repr_alone_means_name_guessed() {
    let temp = tempfile::tempdir().unwrap();
    let query = query_at(&outdir(&temp), 1_186_959_360);
    assert_eq!(classify(&query), FrameStatus::NotStarted);

    Store::write_text_atomic(&query.estimated_riders().query_repr, &query.repr()).unwrap();
    assert_eq!(classify(&query), FrameStatus::NameGuessed);
}

#[test]
fn riders_are_read_in_priority_order() {
    let temp = tempfile::tempdir().unwrap();
    let query = query_at(&outdir(&temp), 1_186_959_360);
    let riders = query.estimated_riders();

    Store::append_text(&riders.error_msg, "DOWNLOAD ERROR at now\n").unwrap();
    assert_eq!(classify(&query), FrameStatus::Error);
    Store::write_text_atomic(&riders.remote_url, "/hdfs/x").unwrap();
    assert_eq!(classify(&query), FrameStatus::RemoteFound);
    Store::write_text_atomic(&riders.remote_sha256, "abc").unwrap();
    assert_eq!(classify(&query), FrameStatus::RemoteHashed);
    Store::write_text_atomic(&riders.local_sha256, "abd").unwrap();
    assert_eq!(classify(&query), FrameStatus::Corrupted);
    Store::write_text_atomic(&riders.local_sha256, "abc").unwrap();
    assert_eq!(classify(&query), FrameStatus::Downloaded);
}

#[test]
fn local_checksum_without_remote_is_maybe_corrupt() {
    let temp = tempfile::tempdir().unwrap();
    let query = query_at(&outdir(&temp), 1_186_959_360);
    Store::write_text_atomic(&query.estimated_riders().local_sha256, "abc").unwrap();
    assert_eq!(classify(&query), FrameStatus::MaybeCorrupt);
}

#[test]
fn buckets_partition_the_queries() {
    let temp = tempfile::tempdir().unwrap();
    let outdir = outdir(&temp);
    let queries = (0..6)
        .map(|index| query_at(&outdir, 1_186_959_360 + index * 4096))
        .collect::<Vec<_>>();

    let riders = |index: usize| queries[index].estimated_riders();
    Store::write_text_atomic(&riders(0).query_repr, "q").unwrap();
    Store::write_text_atomic(&riders(1).remote_url, "/hdfs/x").unwrap();
    Store::write_text_atomic(&riders(2).remote_sha256, "abc").unwrap();
    Store::write_text_atomic(&riders(2).local_sha256, "abc").unwrap();
    Store::append_text(&riders(3).error_msg, "NO REMOTE FILE FOUND at now\n").unwrap();
    Store::append_text(&riders(4).error_msg, "LOCAL_SHA256 ERROR at now\n").unwrap();

    let progress = FrameProgress::check(&queries);
    assert_eq!(progress.total, 6);
    let sum: usize = progress.buckets.iter().map(|bucket| bucket.count).sum();
    assert_eq!(sum, progress.total);
    assert_eq!(progress.count(FrameStatus::NameGuessed), 1);
    assert_eq!(progress.count(FrameStatus::RemoteFound), 1);
    assert_eq!(progress.count(FrameStatus::Downloaded), 1);
    assert_eq!(progress.count(FrameStatus::Error), 2);
    assert_eq!(progress.count(FrameStatus::NotStarted), 1);
    assert_eq!(progress.no_remote_found, 1);
}

#[test]
fn no_remote_found_reads_last_line_only() {
    let temp = tempfile::tempdir().unwrap();
    let query = query_at(&outdir(&temp), 1_186_959_360);
    let log = &query.estimated_riders().error_msg;
    assert!(!no_remote_found(&query));

    Store::append_text(log, "NO REMOTE FILE FOUND at 2017-08-01\n").unwrap();
    assert!(no_remote_found(&query));
    Store::append_text(log, "DOWNLOAD ERROR at 2017-08-02\n\n").unwrap();
    assert!(!no_remote_found(&query));
    Store::append_text(log, "Cannot get GPS start time from filename: \n").unwrap();
    assert!(no_remote_found(&query));
    Store::append_text(log, "DOWNLOAD ERROR at 2017-08-04\n").unwrap();
    assert!(!no_remote_found(&query));
    Store::append_text(
        log,
        "MALFORMED NAME at 2017-08-05. Cannot get GPS start time from filename: \n",
    )
    .unwrap();
    assert!(no_remote_found(&query));
}

#[test]
fn render_lists_every_bucket() {
    let temp = tempfile::tempdir().unwrap();
    let queries = vec![query_at(&outdir(&temp), 1_186_959_360)];
    let rendered = FrameProgress::check(&queries).render();
    let lines = rendered.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), FrameStatus::ALL.len() + 2);
    assert!(lines[0].starts_with("all_queries"));
    assert!(lines[0].ends_with("(100.000%)"));
    assert!(lines.last().unwrap().starts_with("no_remote_found"));
    assert!(rendered.contains("not_started"));
}
