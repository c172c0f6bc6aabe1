mod common;

use std::fs;

use common::{borrowed, numbered, open_bytes, pak, MemoryBinary};
use hoard_archive::{Archive, FileOption};
use hoard_export::manifest::{self, MetaEntry, MetaManifest, SetEntry, SetManifest, SET_FILE};
use hoard_export::{ExportOptions, Exporter, Filter, ImportOptions, Importer};

fn marker_export(archive: &Archive, dest: &std::path::Path) {
    let report = Exporter::new(ExportOptions::default().with_option(FileOption::MARKER))
        .export(archive, dest)
        .unwrap();
    assert!(report.stats.is_complete());
}

#[test]
fn test_export_import_round_trip() {
    let inner = pak(&[("maps/e1m1.bsp", b"level one"), ("progs.dat", b"progs")]);
    let mut entries = numbered(20);
    entries.push(("sub/inner.pak".to_string(), inner));
    entries.push(("empty.cfg".to_string(), Vec::new()));
    let original = open_bytes("pak0.pak", pak(&borrowed(&entries)));

    let exported = tempfile::tempdir().unwrap();
    marker_export(&original, exported.path());

    let set: SetManifest = serde_json::from_slice(&fs::read(exported.path().join(SET_FILE)).unwrap()).unwrap();
    assert_eq!(
        set.archives,
        [SetEntry {
            name: "pak0.pak".into(),
            format: "pak".into()
        }]
    );
    let meta_file = manifest::meta_path(exported.path(), "pak0.pak");
    let meta: MetaManifest = serde_json::from_slice(&fs::read(meta_file).unwrap()).unwrap();
    assert_eq!(meta.files.len(), 22);
    let nested = meta.files.iter().find(|e| e.path == "sub/inner.pak").unwrap();
    assert_eq!(nested.nested.as_deref(), Some("pak"));
    assert!(manifest::meta_path(&exported.path().join("sub/inner.pak"), "inner.pak").is_file());

    let rebuilt_dir = tempfile::tempdir().unwrap();
    let report = Importer::new(ImportOptions::default().with_workers(8))
        .import(exported.path(), rebuilt_dir.path())
        .unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.archives, [rebuilt_dir.path().join("pak0.pak")]);
    // 21 files in the outer table plus 2 in the nested one.
    assert_eq!(report.stats.total, 23);
    assert_eq!(report.stats.imported, 23);

    let rebuilt = Archive::load(rebuilt_dir.path().join("pak0.pak")).unwrap();
    assert_eq!(rebuilt.files().unwrap().len(), 22);
    for file in original.files().unwrap() {
        let expected = original.get_data(file, FileOption::DEFAULT).unwrap();
        let actual = rebuilt.get_data_at(&file.path, FileOption::DEFAULT).unwrap();
        assert_eq!(actual, expected, "{}", file.path);
    }
    assert_eq!(
        rebuilt.get_data_at("sub/inner.pak:maps/e1m1.bsp", FileOption::DEFAULT).unwrap(),
        b"level one"
    );
}

fn read_meta(dir: &std::path::Path, name: &str) -> MetaManifest {
    serde_json::from_slice(&fs::read(manifest::meta_path(dir, name)).unwrap()).unwrap()
}

#[test]
fn test_filtered_marker_export_imports_cleanly() {
    let kept_inner = pak(&[("notes.txt", b"inner notes"), ("skin.bin", b"pixels")]);
    let dropped_inner = pak(&[("model.bin", b"verts")]);
    let original = open_bytes(
        "pak0.pak",
        pak(&[
            ("a.txt", b"alpha"),
            ("b.bin", b"beta"),
            ("c.bin", b"gamma"),
            ("docs/inner.pak", &kept_inner),
            ("art/models.pak", &dropped_inner),
        ]),
    );

    let exported = tempfile::tempdir().unwrap();
    let report = Exporter::new(
        ExportOptions::default()
            .with_option(FileOption::MARKER)
            .with_filter(Filter::glob("*.txt").unwrap()),
    )
    .export(&original, exported.path())
    .unwrap();
    assert_eq!(report.stats.exported, 2);

    let meta = read_meta(exported.path(), "pak0.pak");
    let listed: Vec<_> = meta.files.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(listed, ["a.txt", "docs/inner.pak"]);
    let inner = read_meta(&exported.path().join("docs/inner.pak"), "inner.pak");
    assert_eq!(inner.files.len(), 1);
    assert!(!manifest::meta_path(&exported.path().join("art/models.pak"), "models.pak").exists());

    let rebuilt_dir = tempfile::tempdir().unwrap();
    let report = Importer::new(ImportOptions::default())
        .import(exported.path(), rebuilt_dir.path())
        .unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.stats.total, 2);
    assert_eq!(report.stats.imported, 2);

    let rebuilt = Archive::load(rebuilt_dir.path().join("pak0.pak")).unwrap();
    let paths: Vec<_> = rebuilt.files().unwrap().iter().map(|f| f.path.clone()).collect();
    assert_eq!(paths, ["a.txt", "docs/inner.pak"]);
    assert_eq!(rebuilt.get_data_at("a.txt", FileOption::DEFAULT).unwrap(), b"alpha");
    assert_eq!(
        rebuilt.get_data_at("docs/inner.pak:notes.txt", FileOption::DEFAULT).unwrap(),
        b"inner notes"
    );
}

#[test]
fn test_failed_entries_stay_out_of_the_meta() {
    let entries = numbered(6);
    let archive = MemoryBinary::new(entries.clone()).failing(2).into_archive("broken.mem");

    let exported = tempfile::tempdir().unwrap();
    let report = Exporter::new(ExportOptions::default().with_option(FileOption::MARKER))
        .export(&archive, exported.path())
        .unwrap();
    assert_eq!(report.stats.failed, 1);

    let meta = read_meta(exported.path(), "broken.mem");
    assert_eq!(meta.files.len(), 5);
    assert!(meta.files.iter().all(|e| e.path != entries[2].0));
    // The surviving entries keep their table order.
    let listed: Vec<_> = meta.files.iter().map(|e| e.path.clone()).collect();
    let expected: Vec<_> = entries.iter().map(|(p, _)| p.clone()).filter(|p| *p != entries[2].0).collect();
    assert_eq!(listed, expected);
}

#[test]
fn test_missing_file_is_isolated() {
    let entries = numbered(10);
    let original = open_bytes("pak0.pak", pak(&borrowed(&entries)));
    let exported = tempfile::tempdir().unwrap();
    marker_export(&original, exported.path());

    let removed = &entries[3].0;
    fs::remove_file(exported.path().join(removed)).unwrap();

    let rebuilt_dir = tempfile::tempdir().unwrap();
    let report = Importer::new(ImportOptions::default())
        .import(exported.path(), rebuilt_dir.path())
        .unwrap();

    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.imported, 9);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(&report.failures[0].path, removed);

    let rebuilt = Archive::load(rebuilt_dir.path().join("pak0.pak")).unwrap();
    assert_eq!(rebuilt.files().unwrap().len(), 9);
    assert!(!rebuilt.contains(removed));
    assert!(rebuilt.contains(&entries[4].0));
}

#[test]
fn test_format_without_writer_is_reported() {
    let exported = tempfile::tempdir().unwrap();
    let set = SetManifest {
        archives: vec![SetEntry {
            name: "Data.p4k".into(),
            format: "zip".into(),
        }],
    };
    let meta = MetaManifest {
        archive: "Data.p4k".into(),
        format: "zip".into(),
        files: vec![MetaEntry {
            path: "Data/Game.dcb".into(),
            id: None,
            compressed: 100,
            size: 4,
            nested: None,
        }],
    };
    fs::write(exported.path().join(SET_FILE), serde_json::to_vec(&set).unwrap()).unwrap();
    fs::write(
        manifest::meta_path(exported.path(), "Data.p4k"),
        serde_json::to_vec(&meta).unwrap(),
    )
    .unwrap();

    let rebuilt_dir = tempfile::tempdir().unwrap();
    let report = Importer::new(ImportOptions::default())
        .import(exported.path(), rebuilt_dir.path())
        .unwrap();

    assert!(report.archives.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].archive, "Data.p4k");
    assert!(report.failures[0].message.contains("does not support writing"));
    assert!(!rebuilt_dir.path().join("Data.p4k").exists());
}

#[test]
fn test_missing_set_is_fatal() {
    let empty = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    assert!(Importer::new(ImportOptions::default()).import(empty.path(), out.path()).is_err());
}
