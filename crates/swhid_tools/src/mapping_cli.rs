#![forbid(unsafe_code)]

use swhid_contracts::archive::DirectoryEntry;
use swhid_contracts::swhid::{parse_core_swhid, ObjectId, ObjectType};
use swhid_resolver::directory::{attribute_directory, record_directory_origin};
use swhid_storage::{SharedMappingStore, UpsertOutcome};

pub const MAPPING_USAGE: &str =
    "usage: swhid mapping <ls|add|contents|import-directory|attribute-directory> [args]";

/// `listing` is the JSON directory listing read from stdin, used by the
/// two directory subcommands only.
pub fn execute_mapping_command(
    store: &SharedMappingStore,
    subcommand: &str,
    args: &[String],
    listing: Option<&str>,
) -> Result<String, String> {
    match subcommand {
        "ls" => {
            let hash = parse_content_hash(require_arg(args, 0, "swhid mapping ls <hash>")?)?;
            let rows = store
                .lookup(&hash)
                .map_err(|e| format!("failed to list mappings: {e}"))?;
            Ok(rows
                .iter()
                .map(|row| format!("{} {}", row.created_at.0, row.origin_url))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "add" => {
            let usage = "swhid mapping add <hash> <origin_url>";
            let hash = parse_content_hash(require_arg(args, 0, usage)?)?;
            let origin_url = require_arg(args, 1, usage)?;
            match store
                .upsert(hash, origin_url)
                .map_err(|e| format!("failed to store mapping: {e}"))?
            {
                UpsertOutcome::Inserted(row_id) => Ok(format!("INSERTED {row_id}")),
                UpsertOutcome::AlreadyPresent(row_id) => Ok(format!("PRESENT {row_id}")),
            }
        }
        "contents" => {
            let origin_url = require_arg(args, 0, "swhid mapping contents <origin_url>")?;
            let hashes = store
                .contents_for_origin(origin_url)
                .map_err(|e| format!("failed to list contents: {e}"))?;
            Ok(hashes
                .iter()
                .map(ObjectId::to_hex)
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "import-directory" => {
            let origin_url =
                require_arg(args, 0, "swhid mapping import-directory <origin_url> < listing.json")?;
            let entries = parse_listing(listing)?;
            let report = record_directory_origin(store, &entries, origin_url)
                .map_err(|e| format!("failed to import directory: {e}"))?;
            Ok(format!(
                "inserted={} already_present={} skipped={}",
                report.inserted, report.already_present, report.skipped
            ))
        }
        "attribute-directory" => {
            let entries = parse_listing(listing)?;
            let attributions = attribute_directory(store, &entries);
            Ok(entries
                .iter()
                .zip(attributions.iter())
                .map(|(entry, attribution)| {
                    format!("{} {}", entry.name, attribution.origin_url().unwrap_or("-"))
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        _ => Err(format!(
            "unknown mapping subcommand: {subcommand}. expected one of: ls, add, contents, \
             import-directory, attribute-directory"
        )),
    }
}

/// Accepts a bare 40-digit hash or a core content identifier.
pub fn parse_content_hash(raw: &str) -> Result<ObjectId, String> {
    let raw = raw.trim();
    if raw.starts_with("swh:") {
        let core = parse_core_swhid(raw).map_err(|e| e.to_string())?;
        if core.object_type != ObjectType::Content {
            return Err(format!(
                "mappings are kept for content objects only, got {}",
                core.object_type.name()
            ));
        }
        return Ok(core.object_id);
    }
    ObjectId::from_hex(raw).map_err(|e| format!("invalid content hash '{raw}': {e}"))
}

fn parse_listing(listing: Option<&str>) -> Result<Vec<DirectoryEntry>, String> {
    let raw = listing.ok_or_else(|| "missing directory listing on stdin".to_string())?;
    serde_json::from_str(raw).map_err(|e| format!("invalid directory listing: {e}"))
}

fn require_arg<'a>(args: &'a [String], index: usize, usage: &str) -> Result<&'a str, String> {
    args.get(index)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| format!("usage: {usage}"))
}

#[cfg(test)]
mod tests {
    use super::{execute_mapping_command, parse_content_hash};
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};
    use swhid_storage::{ContentOriginMappingStore, SharedMappingStore};

    const HASH: &str = "94a9ed024d3859793618152ea559a168bbcbb5e2";
    const OPENSSL: &str = "https://github.com/openssl/openssl/";

    fn temp_journal() -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(1);
        std::env::temp_dir().join(format!("swhid-mapping-cli-test-{suffix}.jsonl"))
    }

    fn open(path: &PathBuf) -> SharedMappingStore {
        SharedMappingStore::new(ContentOriginMappingStore::open_with_journal(path.clone()).unwrap())
    }

    fn run(store: &SharedMappingStore, sub: &str, args: &[&str], listing: Option<&str>) -> String {
        let args = args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        execute_mapping_command(store, sub, &args, listing).unwrap()
    }

    #[test]
    fn at_mapping_cli_01_add_is_idempotent_and_persists() {
        let path = temp_journal();
        let store = open(&path);
        assert_eq!(run(&store, "add", &[HASH, OPENSSL], None), "INSERTED 1");
        assert_eq!(run(&store, "add", &[HASH, OPENSSL], None), "PRESENT 1");
        drop(store);

        let reopened = open(&path);
        let listed = run(&reopened, "ls", &[&format!("swh:1:cnt:{HASH}")], None);
        assert!(listed.ends_with(OPENSSL));
        assert_eq!(listed.lines().count(), 1);
        assert_eq!(run(&reopened, "contents", &[OPENSSL], None), HASH);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn at_mapping_cli_02_directory_import_and_attribution() {
        let store = SharedMappingStore::default();
        let listing = format!(
            r#"[
                {{"name":"README","type":"file","target":"{HASH}"}},
                {{"name":"src","type":"dir","target":"0000000000000000000000000000000000000002"}}
            ]"#
        );
        assert_eq!(
            run(&store, "import-directory", &[OPENSSL], Some(&listing)),
            "inserted=1 already_present=0 skipped=1"
        );
        assert_eq!(
            run(&store, "attribute-directory", &[], Some(&listing)),
            format!("README {OPENSSL}\nsrc -")
        );
    }

    #[test]
    fn at_mapping_cli_03_rejects_bad_input() {
        let store = SharedMappingStore::default();
        assert!(parse_content_hash("swh:1:rev:96db9023b881d7cd9f379b0c154650d6c108e9a3").is_err());
        assert!(parse_content_hash("ABC").is_err());
        let none: Vec<String> = Vec::new();
        assert!(execute_mapping_command(&store, "add", &none, None).is_err());
        assert!(execute_mapping_command(&store, "import-directory", &none, None).is_err());
        assert!(execute_mapping_command(&store, "rm", &none, None).is_err());
        assert!(execute_mapping_command(
            &store,
            "attribute-directory",
            &none,
            Some("{not json")
        )
        .is_err());
    }
}
