//! CSV export and import. Credentials only.

use std::collections::HashMap;

use uuid::Uuid;

use crate::vault::model::{Block, Credential, Vault, DEFAULT_BLOCK_NAME};
use crate::vault::{VaultError, VaultResult};

const HEADER: [&str; 4] = ["Block", "Site", "Username", "Secret"];

const BLOCK_ALIASES: &[&str] = &["block", "group", "folder"];
const SITE_ALIASES: &[&str] = &["site", "url", "name", "title"];
const USERNAME_ALIASES: &[&str] = &["username", "user", "login"];
const SECRET_ALIASES: &[&str] = &["secret", "password"];

fn csv_error(e: ::csv::Error) -> VaultError {
    VaultError::Malformed(format!("CSV: {}", e))
}

pub(super) fn encode(vault: &Vault) -> VaultResult<Vec<u8>> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER).map_err(csv_error)?;

    for credential in &vault.credentials {
        writer
            .write_record([
                vault.block_name(&credential.block_id),
                credential.site.as_str(),
                credential.username.as_str(),
                credential.secret_value.expose(),
            ])
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| VaultError::Malformed(format!("CSV: {}", e.error())))
}

/// Column positions resolved from a header row.
#[derive(Debug, Default)]
struct Columns {
    block: Option<usize>,
    site: Option<usize>,
    username: Option<usize>,
    secret: Option<usize>,
}

impl Columns {
    fn resolve<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut columns = Self::default();
        for (index, header) in headers.into_iter().enumerate() {
            let name = header.trim().to_ascii_lowercase();
            let slot = if BLOCK_ALIASES.contains(&name.as_str()) {
                &mut columns.block
            } else if SITE_ALIASES.contains(&name.as_str()) {
                &mut columns.site
            } else if USERNAME_ALIASES.contains(&name.as_str()) {
                &mut columns.username
            } else if SECRET_ALIASES.contains(&name.as_str()) {
                &mut columns.secret
            } else {
                continue;
            };
            // First matching column wins
            slot.get_or_insert(index);
        }
        columns
    }

    fn is_usable(&self) -> bool {
        self.site.is_some() || self.secret.is_some()
    }
}

/// Whether the first line of `text` names at least a site or secret column.
pub(super) fn looks_like_header(text: &str) -> bool {
    let first = text.lines().next().unwrap_or_default();
    first.contains(',') && Columns::resolve(first.split(',').map(|h| h.trim_matches('"'))).is_usable()
}

pub(super) fn decode(bytes: &[u8]) -> VaultResult<Vault> {
    let bytes = bytes.strip_prefix("\u{feff}".as_bytes()).unwrap_or(bytes);
    let mut reader = ::csv::ReaderBuilder::new()
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(bytes);

    let columns = Columns::resolve(reader.headers().map_err(csv_error)?.iter());
    if !columns.is_usable() {
        return Err(VaultError::Malformed(
            "CSV header has no site or password column".into(),
        ));
    }

    let mut vault = Vault::new();
    let mut block_ids: HashMap<String, String> = HashMap::new();
    block_ids.insert(DEFAULT_BLOCK_NAME.to_string(), vault.blocks[0].id.clone());

    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let field = |index: Option<usize>| index.and_then(|i| record.get(i)).unwrap_or_default();

        let site = field(columns.site);
        let username = field(columns.username);
        let secret = field(columns.secret);
        if site.is_empty() && username.is_empty() && secret.is_empty() {
            continue;
        }

        let block_name = match field(columns.block) {
            "" => DEFAULT_BLOCK_NAME,
            name => name,
        };
        let block_id = block_ids
            .entry(block_name.to_string())
            .or_insert_with(|| {
                let block = Block {
                    id: Uuid::new_v4().to_string(),
                    name: block_name.to_string(),
                };
                let id = block.id.clone();
                vault.blocks.push(block);
                id
            })
            .clone();

        vault.credentials.push(Credential {
            id: Uuid::new_v4().to_string(),
            block_id,
            site: site.to_string(),
            username: username.to_string(),
            secret_value: secret.into(),
        });
    }

    Ok(vault)
}
