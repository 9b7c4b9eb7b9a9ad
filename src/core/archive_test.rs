use super::*;
use crate::Error;

fn record(
    data_id: &str,
    group: &str,
    content: &str,
    app: Option<&str>,
) -> ConfigRecord {
    ConfigRecord::new(ConfigKey::new(data_id, group, "dev"), Variant::Formal, content)
        .with_app_name(app.map(String::from))
}

#[test]
fn export_names_items_by_group_and_data_id() {
    let archive = Archive::from_records(&[record("app.yaml", "G1", "a: 1", None), record("db", "G2", "x", None)]);

    assert_eq!(archive.items, vec![
        ArchiveItem::new("G1/app.yaml", "a: 1"),
        ArchiveItem::new("G2/db", "x"),
    ]);
}

#[test]
fn export_writes_manifest_for_app_names() {
    let archive = Archive::from_records(&[
        record("app.service.yaml", "G1", "a", Some("billing")),
        record("plain", "G1", "b", None),
        record("db", "G2", "c", Some("orders")),
    ]);

    let meta = archive.items.last().unwrap();
    assert_eq!(meta.name, ".meta.yml");
    assert_eq!(meta.data, "G1.app.service~yaml.app=billing\r\nG2.db.app=orders\r\n");
    assert_eq!(archive.items.len(), 4);
}

#[test]
fn import_restores_records_and_app_names_into_target_tenant() {
    let exported = Archive::from_records(&[
        record("app.yaml", "G1", "a: 1", Some("billing")),
        record("db", "G2", "x", None),
    ]);

    let items = exported.into_batch("prod").unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].key, ConfigKey::new("app.yaml", "G1", "prod"));
    assert_eq!(items[0].content, "a: 1");
    assert_eq!(items[0].app_name.as_deref(), Some("billing"));
    assert_eq!(items[1].key, ConfigKey::new("db", "G2", "prod"));
    assert_eq!(items[1].app_name, None);
}

#[test]
fn app_name_containing_equals_sign_survives_export_and_import() {
    let exported = Archive::from_records(&[record("a.yaml", "G", "x", Some("team=billing"))]);

    let items = exported.into_batch("").unwrap();

    assert_eq!(items[0].app_name.as_deref(), Some("team=billing"));
}

#[test]
fn import_rejects_malformed_manifest_line() {
    let archive = Archive::new(vec![
        ArchiveItem::new("G/a", "x"),
        ArchiveItem::new(".meta.yml", "=billing\r\n"),
    ]);

    assert!(matches!(archive.into_batch(""), Err(Error::Validation(_))));

    let archive = Archive::new(vec![
        ArchiveItem::new("G/a", "x"),
        ArchiveItem::new(".meta.yml", "no-equals-sign"),
    ]);
    assert!(archive.into_batch("").is_err());
}

#[test]
fn import_rejects_items_not_named_group_slash_data_id() {
    for name in ["flat", "a/b/c", "/a", "a/"] {
        let archive = Archive::new(vec![ArchiveItem::new(name, "x")]);
        assert!(matches!(archive.into_batch(""), Err(Error::Validation(_))), "{name}");
    }
}

#[test]
fn import_of_empty_archive_fails() {
    assert!(Archive::default().into_batch("").is_err());

    let only_meta = Archive::new(vec![ArchiveItem::new(".meta.yml", "G.a.app=x\r\n")]);
    assert!(matches!(only_meta.into_batch(""), Err(Error::Validation(_))));
}
