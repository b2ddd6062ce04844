use crate::schema::{MAPPING_TABLE, Mapping, PostbackRecord, SOURCE_COLUMN, Slot, mapping_columns};
use crate::store::{BulkLoadSupport, Payload, Store, StoreError};
use async_trait::async_trait;
use http_body_util::BodyExt;
use parking_lot::RwLock;

#[derive(Default)]
struct Tables {
    mappings: Vec<Mapping>,
    postbacks: Vec<PostbackRecord>,
}

/// In-process store. A bulk load replaces every row of the sources it
/// carries; `insert_mapping` appends, so duplicated mappings can be represented.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    bulk_load: bool,
}

impl MemoryStore {
    pub fn new(bulk_load: bool) -> Self {
        MemoryStore {
            tables: RwLock::new(Tables::default()),
            bulk_load,
        }
    }

    pub fn insert_mapping(&self, mapping: Mapping) {
        self.tables.write().mappings.push(mapping);
    }

    pub fn mappings(&self) -> Vec<Mapping> {
        self.tables.read().mappings.clone()
    }

    pub fn postbacks(&self) -> Vec<PostbackRecord> {
        self.tables.read().postbacks.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_mappings(&self, source: &str) -> Result<Vec<Mapping>, StoreError> {
        Ok(self
            .tables
            .read()
            .mappings
            .iter()
            .filter(|mapping| mapping.source == source)
            .cloned()
            .collect())
    }

    async fn insert_postback(&self, record: &PostbackRecord) -> Result<(), StoreError> {
        self.tables.write().postbacks.push(record.clone());
        Ok(())
    }

    fn bulk_load_support(&self, table: &str) -> BulkLoadSupport {
        match self.bulk_load && table == MAPPING_TABLE {
            true => BulkLoadSupport::Streaming,
            false => BulkLoadSupport::Unsupported,
        }
    }

    async fn bulk_load(
        &self,
        table: &str,
        columns: &[String],
        mut payload: Payload,
    ) -> Result<u64, StoreError> {
        if self.bulk_load_support(table) == BulkLoadSupport::Unsupported {
            return Err(StoreError::Rejected(format!(
                "bulk load into {table} is not supported"
            )));
        }

        let mut parser = RowParser::new(columns)?;
        let mut pending: Vec<u8> = Vec::new();

        while let Some(frame) = payload.frame().await {
            let frame = frame.map_err(StoreError::Payload)?;
            let Ok(data) = frame.into_data() else {
                continue;
            };
            pending.extend_from_slice(&data);

            while let Some(end) = record_end(&pending) {
                let line: Vec<u8> = pending.drain(..=end).collect();
                parser.push_line(&line[..end])?;
            }
        }
        if !pending.is_empty() {
            parser.push_line(&pending)?;
        }

        // Rows become visible all at once, like a committed COPY.
        let rows = parser.rows;
        let count = rows.len() as u64;
        let mut tables = self.tables.write();
        tables
            .mappings
            .retain(|existing| !rows.iter().any(|row| row.source == existing.source));
        tables.mappings.extend(rows);
        Ok(count)
    }

    fn is_ready(&self) -> bool {
        true
    }
}

/// Position of the first newline outside a quoted field.
fn record_end(buf: &[u8]) -> Option<usize> {
    let mut quoted = false;
    for (i, b) in buf.iter().enumerate() {
        match b {
            b'"' => quoted = !quoted,
            b'\n' if !quoted => return Some(i),
            _ => {}
        }
    }
    None
}

/// Splits one CSV record. Quoted fields may hold commas, newlines and `""`
/// escapes. An unquoted empty field is NULL, a quoted one is an empty string.
fn split_record(line: &str) -> Result<Vec<Option<String>>, StoreError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut was_quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            ('"', true) => quoted = false,
            ('"', false) if field.is_empty() && !was_quoted => {
                quoted = true;
                was_quoted = true;
            }
            (',', false) => {
                let done = std::mem::take(&mut field);
                fields.push((was_quoted || !done.is_empty()).then_some(done));
                was_quoted = false;
            }
            ('"', false) => {
                return Err(StoreError::Rejected(format!(
                    "unexpected quote in row {line:?}"
                )));
            }
            (c, _) => field.push(c),
        }
    }
    if quoted {
        return Err(StoreError::Rejected(format!(
            "unterminated quoted field in row {line:?}"
        )));
    }
    fields.push((was_quoted || !field.is_empty()).then_some(field));
    Ok(fields)
}

/// Turns CSV records into mapping rows in header column order.
/// The first record is the header and is skipped.
struct RowParser {
    width: usize,
    source: Option<usize>,
    slots: [Option<usize>; 3],
    header_seen: bool,
    rows: Vec<Mapping>,
}

impl RowParser {
    fn new(columns: &[String]) -> Result<Self, StoreError> {
        if let Some(unknown) = columns
            .iter()
            .find(|column| !mapping_columns().any(|known| known == column.as_str()))
        {
            return Err(StoreError::Rejected(format!(
                "column {unknown} of relation {MAPPING_TABLE} does not exist"
            )));
        }

        let position = |name: &str| columns.iter().position(|column| column == name);
        Ok(RowParser {
            width: columns.len(),
            source: position(SOURCE_COLUMN),
            slots: [
                position(Slot::SubjectId.column()),
                position(Slot::Code.column()),
                position(Slot::Goal.column()),
            ],
            header_seen: false,
            rows: Vec::new(),
        })
    }

    fn push_line(&mut self, line: &[u8]) -> Result<(), StoreError> {
        if !self.header_seen {
            self.header_seen = true;
            return Ok(());
        }

        let line = std::str::from_utf8(line)
            .map_err(|e| StoreError::Rejected(format!("invalid UTF-8 in row: {e}")))?;
        let line = line.strip_suffix('\r').unwrap_or(line);
        let values = split_record(line)?;
        if values.len() != self.width {
            return Err(StoreError::Rejected(format!(
                "expected {} columns, found {} in row {:?}",
                self.width,
                values.len(),
                line
            )));
        }

        let value = |position: Option<usize>, column: &str| {
            position
                .and_then(|i| values[i].clone())
                .ok_or_else(|| StoreError::Rejected(format!("null value in column {column}")))
        };

        self.rows.push(Mapping::new(
            value(self.source, SOURCE_COLUMN)?,
            value(self.slots[0], Slot::SubjectId.column())?,
            value(self.slots[1], Slot::Code.column())?,
            value(self.slots[2], Slot::Goal.column())?,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};

    fn payload(data: &'static str) -> Payload {
        Full::new(Bytes::from(data))
            .map_err(|e| match e {})
            .boxed_unsync()
    }

    fn columns(header: &str) -> Vec<String> {
        header.split(',').map(String::from).collect()
    }

    #[tokio::test]
    async fn test_bulk_load_column_order() {
        let store = MemoryStore::new(true);
        let loaded = store
            .bulk_load(
                MAPPING_TABLE,
                &columns("aim,source,code,user_id"),
                payload("aim,source,code,user_id\r\ngoal,aff1,clickid,uid\r\ntarget,aff2,cid,sub\n"),
            )
            .await
            .unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(
            store.mappings(),
            vec![
                Mapping::new("aff1", "uid", "clickid", "goal"),
                Mapping::new("aff2", "sub", "cid", "target"),
            ]
        );
    }

    #[tokio::test]
    async fn test_bulk_load_rejects_whole_payload() {
        let store = MemoryStore::new(true);
        let result = store
            .bulk_load(
                MAPPING_TABLE,
                &columns("source,user_id,code,aim"),
                payload("source,user_id,code,aim\naff1,uid,clickid,goal\naff2,uid\n"),
            )
            .await;

        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert!(store.mappings().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_load_unknown_column() {
        let store = MemoryStore::new(true);
        let result = store
            .bulk_load(
                MAPPING_TABLE,
                &columns("source,uid_field"),
                payload("source,uid_field\n"),
            )
            .await;

        assert!(matches!(result, Err(StoreError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_bulk_load_missing_column() {
        let store = MemoryStore::new(true);
        let result = store
            .bulk_load(
                MAPPING_TABLE,
                &columns("source,user_id,code"),
                payload("source,user_id,code\naff1,uid,clickid"),
            )
            .await;

        assert!(matches!(result, Err(StoreError::Rejected(_))));

        // Header only, nothing to reject
        let loaded = store
            .bulk_load(
                MAPPING_TABLE,
                &columns("source,user_id,code"),
                payload("source,user_id,code\n"),
            )
            .await
            .unwrap();
        assert_eq!(loaded, 0);
    }

    #[tokio::test]
    async fn test_bulk_load_replaces_source() {
        let store = MemoryStore::new(true);
        store.insert_mapping(Mapping::new("aff2", "sub", "cid", "target"));
        let header = columns("source,user_id,code,aim");

        store
            .bulk_load(
                MAPPING_TABLE,
                &header,
                payload("source,user_id,code,aim\naff1,uid,clickid,goal\n"),
            )
            .await
            .unwrap();
        let loaded = store
            .bulk_load(
                MAPPING_TABLE,
                &header,
                payload("source,user_id,code,aim\naff1,sub,cid,target\n"),
            )
            .await
            .unwrap();

        assert_eq!(loaded, 1);
        assert_eq!(
            store.find_mappings("aff1").await.unwrap(),
            vec![Mapping::new("aff1", "sub", "cid", "target")]
        );
        // Sources absent from the payload are untouched
        assert_eq!(store.find_mappings("aff2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_load_quoted_fields() {
        let store = MemoryStore::new(true);
        let loaded = store
            .bulk_load(
                MAPPING_TABLE,
                &columns("source,user_id,code,aim"),
                payload("source,user_id,code,aim\naff1,\"u,id\",\"click\"\"id\",goal\n\"aff2\",\"sub\nline\",\"\",aim\n"),
            )
            .await
            .unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(
            store.mappings(),
            vec![
                Mapping::new("aff1", "u,id", "click\"id", "goal"),
                Mapping::new("aff2", "sub\nline", "", "aim"),
            ]
        );
    }

    #[tokio::test]
    async fn test_bulk_load_null_value() {
        let store = MemoryStore::new(true);
        let result = store
            .bulk_load(
                MAPPING_TABLE,
                &columns("source,user_id,code,aim"),
                payload("source,user_id,code,aim\naff1,,clickid,goal\n"),
            )
            .await;

        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert!(store.mappings().is_empty());
    }

    #[test]
    fn test_split_record() {
        assert_eq!(
            split_record("a,,\"\",\"x\"\"y\"").unwrap(),
            vec![
                Some("a".to_string()),
                None,
                Some(String::new()),
                Some("x\"y".to_string()),
            ]
        );
        assert!(split_record("a,\"open").is_err());
        assert!(split_record("a,b\"c").is_err());
        assert_eq!(record_end(b"a,\"b\nc\"\nd"), Some(7));
        assert_eq!(record_end(b"a,\"b\n"), None);
    }

    #[test]
    fn test_support() {
        assert_eq!(
            MemoryStore::new(true).bulk_load_support(MAPPING_TABLE),
            BulkLoadSupport::Streaming
        );
        assert_eq!(
            MemoryStore::new(true).bulk_load_support("postback"),
            BulkLoadSupport::Unsupported
        );
        assert_eq!(
            MemoryStore::new(false).bulk_load_support(MAPPING_TABLE),
            BulkLoadSupport::Unsupported
        );
    }
}
