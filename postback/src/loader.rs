use crate::errors::PostbackError;
use crate::payload::Replay;
use crate::schema::MAPPING_TABLE;
use crate::store::{BoxError, BulkLoadSupport, Store, StoreError};
use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::body::Body;

const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Streams a CSV payload into the mapping table through the store's bulk
/// transport. Only the header line is read here; data rows are parsed by the
/// store. Returns the number of rows loaded.
pub async fn load_mappings<B>(store: &dyn Store, mut payload: B) -> Result<u64, PostbackError>
where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<BoxError>,
{
    let mut head = BytesMut::new();
    let mut scanned = 0;

    let header_end = loop {
        if let Some(i) = head[scanned..].iter().position(|b| *b == b'\n') {
            break Some(scanned + i);
        }
        if head.len() > MAX_HEADER_BYTES {
            return Err(PostbackError::Validation("Header line is too long".into()));
        }
        scanned = head.len();

        match payload.frame().await {
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    head.extend_from_slice(&data);
                }
            }
            Some(Err(e)) => return Err(StoreError::Payload(e.into()).into()),
            None => break None,
        }
    };

    if head.is_empty() {
        return Err(PostbackError::Validation("Empty file".into()));
    }

    let columns = parse_header(&head[..header_end.unwrap_or(head.len())])?;

    if store.bulk_load_support(MAPPING_TABLE) == BulkLoadSupport::Unsupported {
        return Err(PostbackError::Unsupported);
    }

    let payload = Replay::new(head.freeze(), payload).boxed_unsync();
    let rows = store.bulk_load(MAPPING_TABLE, &columns, payload).await?;

    tracing::info!(rows, columns = ?columns, "loaded mappings");
    Ok(rows)
}

/// Column names from the header line. They end up in the store's load
/// statement, so only plain identifiers are accepted.
fn parse_header(line: &[u8]) -> Result<Vec<String>, PostbackError> {
    let line = std::str::from_utf8(line)
        .map_err(|_| PostbackError::Validation("Header is not valid UTF-8".into()))?;
    let line = line.strip_suffix('\r').unwrap_or(line);

    line.split(',')
        .map(str::trim)
        .map(|column| match is_identifier(column) {
            true => Ok(column.to_string()),
            false => Err(PostbackError::Validation(format!(
                "Invalid column name <{column}>"
            ))),
        })
        .collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;
    use crate::schema::Mapping;
    use crate::store::MemoryStore;
    use crate::testutils::{ChunkedBody, aff1_store};
    use http_body_util::{Empty, Full};

    fn full(data: &'static str) -> Full<Bytes> {
        Full::new(Bytes::from(data))
    }

    fn validation_message(result: Result<u64, PostbackError>) -> String {
        match result {
            Err(PostbackError::Validation(message)) => message,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_file() {
        let store = aff1_store(true);

        let result = load_mappings(&store, Empty::<Bytes>::new()).await;
        assert_eq!(validation_message(result), "Empty file");
        assert_eq!(store.mappings().len(), 1);

        // Empty store without bulk support still reports the payload problem first
        let store = MemoryStore::new(false);
        let result = load_mappings(&store, full("")).await;
        assert_eq!(validation_message(result), "Empty file");
    }

    #[tokio::test]
    async fn test_load_then_resolve() {
        let store = MemoryStore::new(true);
        let payload = full("source,user_id,code,aim\naff1,uid,clickid,goal\n");

        let rows = load_mappings(&store, payload).await.unwrap();
        assert_eq!(rows, 1);
        assert_eq!(
            resolve(&store, "aff1").await.unwrap(),
            Mapping::new("aff1", "uid", "clickid", "goal")
        );
    }

    #[tokio::test]
    async fn test_reload_overwrites_source() {
        let store = aff1_store(true);
        let payload = full("source,user_id,code,aim\naff1,sub,cid,target\n");

        assert_eq!(load_mappings(&store, payload).await.unwrap(), 1);
        assert_eq!(
            resolve(&store, "aff1").await.unwrap(),
            Mapping::new("aff1", "sub", "cid", "target")
        );
    }

    #[tokio::test]
    async fn test_header_split_across_frames() {
        let payload = ChunkedBody::new(&[
            "code,so",
            "urce,aim,user_id\r",
            "\nclickid,aff3,goal,",
            "uid\r\n",
        ]);

        let store = MemoryStore::new(true);
        assert_eq!(load_mappings(&store, payload).await.unwrap(), 1);
        assert_eq!(
            store.mappings(),
            vec![Mapping::new("aff3", "uid", "clickid", "goal")]
        );
    }

    #[tokio::test]
    async fn test_unsupported() {
        let store = MemoryStore::new(false);
        let result = load_mappings(&store, full("source,user_id,code,aim\naff1,a,b,c\n")).await;

        assert!(matches!(result, Err(PostbackError::Unsupported)));
        assert!(store.mappings().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_rows_are_upstream_errors() {
        let store = MemoryStore::new(true);
        let result = load_mappings(&store, full("source,user_id,code,aim\naff1,a\n")).await;

        assert!(matches!(
            result,
            Err(PostbackError::Upstream(StoreError::Rejected(_)))
        ));
    }

    #[tokio::test]
    async fn test_header_too_long() {
        let store = MemoryStore::new(true);
        let payload = Full::new(Bytes::from("a".repeat(MAX_HEADER_BYTES + 1)));

        let result = load_mappings(&store, payload).await;
        assert_eq!(validation_message(result), "Header line is too long");
        assert!(store.mappings().is_empty());

        // Long data after a short header is streamed as usual
        let mut data = String::from("source,user_id,code,aim\n");
        for i in 0..5000 {
            data.push_str(&format!("aff{i},uid,clickid,goal\n"));
        }
        let rows = load_mappings(&store, Full::new(Bytes::from(data)))
            .await
            .unwrap();
        assert_eq!(rows, 5000);
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header(b"source, user_id ,code,aim\r").unwrap(),
            vec!["source", "user_id", "code", "aim"]
        );
        assert_eq!(
            parse_header(b"source,uid_field,click_field,goal_field").unwrap(),
            vec!["source", "uid_field", "click_field", "goal_field"]
        );

        let invalid: [&[u8]; 5] = [
            b"",
            b"source,",
            b"source;drop table mapping",
            b"1abc",
            b"\"source\"",
        ];
        for header in invalid {
            assert!(
                matches!(parse_header(header), Err(PostbackError::Validation(_))),
                "{header:?} should be rejected"
            );
        }
        assert_eq!(
            parse_header(b"source,user id").unwrap_err().to_string(),
            "Invalid column name <user id>"
        );
    }
}
