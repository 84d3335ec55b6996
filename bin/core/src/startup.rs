use database::mungos::{
  find::find_collect, mongodb::bson::Document,
};

use crate::state::db_client;

/// This function should be run on startup,
/// after the db client has been initialized.
pub async fn on_startup() {
  report_stuck_mutexes().await;
}

/// Scan mutexes have no lease. A row surviving into a fresh boot
/// usually means a worker died mid-scan; surface them so the
/// operator can clear the ones no live scan holds. Not cleared
/// automatically -- other workers sharing the database may still
/// be scanning.
async fn report_stuck_mutexes() {
  let mutexes = match find_collect(
    &db_client().mutexes,
    Document::new(),
    None,
  )
  .await
  {
    Ok(mutexes) => mutexes,
    Err(e) => {
      error!("failed to list scan mutexes on startup | {e:#}");
      return;
    }
  };
  for mutex in mutexes {
    warn!(
      "scan mutex {} held since before this boot (created_at: {}) | clear it administratively if its scan is gone",
      mutex.name, mutex.created_at,
    );
  }
}
