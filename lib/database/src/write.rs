use mungos::mongodb::{
  Database,
  bson::{Document, doc},
};

/// One staged entity write. `insert` records whether the row was
/// absent when the processor read it: inserts must go through
/// `insert_one` so a concurrent creation of the same key surfaces
/// as a duplicate-key error instead of silently overwriting.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedUpsert {
  pub collection: &'static str,
  /// Primary key filter, eg. `{ "_id": 1296269 }` or
  /// `{ "repo_id": 1, "number": 3 }`.
  pub key: Document,
  pub document: Document,
  pub insert: bool,
}

/// An explicit write batch, passed through a processor call tree.
/// Referenced entities are staged before their parents and flushed
/// in that order by [commit](UnitOfWork::commit).
///
/// Staging the same (collection, key) twice folds into the first
/// entry, which is also visible to later reads through
/// [staged](UnitOfWork::staged) -- the in-flight batch acts as the
/// identity map a recursive processor expects.
#[derive(Debug, Default)]
pub struct UnitOfWork {
  writes: Vec<StagedUpsert>,
}

impl UnitOfWork {
  /// The staged document for a key, if this batch already wrote
  /// one. Processors consult this before reading the collection so
  /// an entity mentioned twice in one payload accumulates fields
  /// instead of re-inserting.
  pub fn staged(
    &self,
    collection: &'static str,
    key: &Document,
  ) -> Option<&Document> {
    self
      .writes
      .iter()
      .find(|w| w.collection == collection && &w.key == key)
      .map(|w| &w.document)
  }

  /// Stage a write. If the (collection, key) is already staged, the
  /// document replaces the staged one in place (keeping the original
  /// position and insert-ness); otherwise it is appended.
  pub fn stage(
    &mut self,
    collection: &'static str,
    key: Document,
    document: Document,
    insert: bool,
  ) {
    let existing = self
      .writes
      .iter_mut()
      .find(|w| w.collection == collection && w.key == key);
    match existing {
      Some(staged) => staged.document = document,
      None => self.writes.push(StagedUpsert {
        collection,
        key,
        document,
        insert,
      }),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.writes.is_empty()
  }

  pub fn len(&self) -> usize {
    self.writes.len()
  }

  /// Flush the batch in staging order. Drains even on failure --
  /// a failed batch is not retryable as-is, the caller re-runs the
  /// whole processor against the now-current rows.
  pub async fn commit(
    &mut self,
    db: &Database,
  ) -> Result<(), mungos::mongodb::error::Error> {
    for write in self.writes.drain(..) {
      debug!(
        "committing {} write to {} | {:?}",
        if write.insert { "insert" } else { "replace" },
        write.collection,
        write.key,
      );
      let collection = db.collection::<Document>(write.collection);
      if write.insert {
        collection.insert_one(write.document).await?;
      } else {
        collection.replace_one(write.key, write.document).await?;
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stage_folds_duplicate_keys_in_place() {
    let mut uow = UnitOfWork::default();
    uow.stage("users", doc! { "_id": 1 }, doc! { "login": "a" }, true);
    uow.stage("repos", doc! { "_id": 2 }, doc! { "name": "r" }, true);
    uow.stage(
      "users",
      doc! { "_id": 1 },
      doc! { "login": "a", "name": "Ada" },
      false,
    );

    assert_eq!(uow.len(), 2);
    let staged = uow.staged("users", &doc! { "_id": 1 }).unwrap();
    assert_eq!(staged.get_str("name").unwrap(), "Ada");
  }

  #[test]
  fn folding_keeps_first_position_and_insertness() {
    let mut uow = UnitOfWork::default();
    uow.stage("users", doc! { "_id": 1 }, doc! {}, true);
    uow.stage("repos", doc! { "_id": 2 }, doc! {}, true);
    // Re-staging through a later read is not an insert, but the
    // original staging was -- the insert must survive.
    uow.stage("users", doc! { "_id": 1 }, doc! { "x": 1 }, false);

    let writes: Vec<_> = (0..uow.len())
      .map(|i| uow.writes[i].clone())
      .collect();
    assert_eq!(writes[0].collection, "users");
    assert!(writes[0].insert);
  }

  #[test]
  fn same_key_different_collections_do_not_collide() {
    let mut uow = UnitOfWork::default();
    uow.stage("users", doc! { "_id": 1 }, doc! { "a": 1 }, true);
    uow.stage("issues", doc! { "_id": 1 }, doc! { "b": 2 }, true);
    assert_eq!(uow.len(), 2);
  }
}
