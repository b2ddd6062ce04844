use crate::errors::PostbackError;
use crate::schema::Mapping;
use crate::store::Store;

/// Looks up the single mapping declared for `source`. A missing mapping and a
/// duplicated one are both reported as `NotFound`.
pub async fn resolve(store: &dyn Store, source: &str) -> Result<Mapping, PostbackError> {
    let mut rows = store.find_mappings(source).await?;

    match rows.len() {
        1 => Ok(rows.swap_remove(0)),
        count => {
            tracing::debug!(source, rows = count, "no unique mapping for source");
            Err(PostbackError::NotFound)
        }
    }
}
