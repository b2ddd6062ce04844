use crate::errors::PostbackError;
use crate::schema::PostbackRecord;
use crate::store::Store;
use crate::translator::TranslatedFields;

/// Persists one postback. Store failures are returned as they are, without retry.
pub async fn write(
    store: &dyn Store,
    fields: TranslatedFields,
    source: &str,
) -> Result<(), PostbackError> {
    let record = PostbackRecord {
        subject_id: fields.subject_id,
        code: fields.code,
        goal: fields.goal.code(),
        source: source.to_string(),
    };

    store.insert_postback(&record).await?;
    Ok(())
}
