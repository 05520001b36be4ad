use std::time::Duration;

use rusqlite::Connection;

use crate::error::AppResult;

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

/// Applies pending schema migrations
///
/// refinery wraps each migration in its own transaction, the busy timeout
/// covers several instances starting against the same file.
pub fn run_migrations(conn: &mut Connection) -> AppResult<()> {
    conn.busy_timeout(Duration::from_secs(30))?;
    let report = embedded::migrations::runner().run(conn)?;
    for migration in report.applied_migrations() {
        log::info!("Applied migration {}", migration);
    }
    Ok(())
}
