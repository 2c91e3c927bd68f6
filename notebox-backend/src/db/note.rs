use chrono::{DateTime, Utc};
use notebox_shared::api::PageWindow;
use notebox_shared::error::NoteError;
use notebox_shared::note::{non_blank, NoteBody};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use sea_query::{Expr, Func, LikeExpr};
use tracing::debug;

use crate::entity::note;

/// A validated note waiting to be inserted
#[derive(Debug, Clone)]
pub struct NewNote {
    pub body: NoteBody,
    pub tags: Option<String>,
}

impl NewNote {
    pub fn new(body: NoteBody, tags: Option<String>) -> Self {
        Self { body, tags }
    }

    fn into_active_model(self, now: DateTime<Utc>) -> note::ActiveModel {
        let note_type = self.body.note_type();
        let (content, file_name, file_path, mime_type) = match self.body {
            NoteBody::Text(content) | NoteBody::Link(content) => (Some(content), None, None, None),
            NoteBody::File { caption, file } => (
                caption,
                Some(file.file_name),
                Some(file.file_path),
                Some(file.mime_type),
            ),
        };

        note::ActiveModel {
            note_type: Set(note_type),
            content: Set(content),
            file_name: Set(file_name),
            file_path: Set(file_path),
            mime_type: Set(mime_type),
            tags: Set(non_blank(self.tags)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
    }
}

/// Insert all notes in one transaction, either every row lands or none does
pub async fn insert_notes(
    conn: &DatabaseConnection,
    notes: Vec<NewNote>,
) -> Result<Vec<note::Model>, NoteError> {
    let txn = conn.begin().await?;
    let now = Utc::now();

    let mut saved = Vec::with_capacity(notes.len());
    for new_note in notes {
        let model = new_note.into_active_model(now).insert(&txn).await?;
        debug!(id = model.id, note_type = %model.note_type, "Inserted note");
        saved.push(model);
    }

    txn.commit().await?;
    Ok(saved)
}

pub async fn find_note(conn: &DatabaseConnection, id: i64) -> Result<Option<note::Model>, NoteError> {
    Ok(note::Entity::find_by_id(id).one(conn).await?)
}

pub async fn find_note_by_file_path(
    conn: &DatabaseConnection,
    file_path: &str,
) -> Result<Option<note::Model>, NoteError> {
    Ok(note::Entity::find()
        .filter(note::Column::FilePath.eq(file_path))
        .one(conn)
        .await?)
}

/// Newest first, optionally filtered, along with the number of matching notes
pub async fn list_notes(
    conn: &DatabaseConnection,
    search: Option<&str>,
    window: PageWindow,
) -> Result<(Vec<note::Model>, u64), NoteError> {
    let mut query = note::Entity::find();
    if let Some(term) = search {
        query = query.filter(search_condition(term));
    }

    let total = query.clone().count(conn).await?;
    let items = query
        .order_by_desc(note::Column::CreatedAt)
        .order_by_desc(note::Column::Id)
        .offset(window.offset)
        .limit(window.limit)
        .all(conn)
        .await?;

    Ok((items, total))
}

pub async fn count_notes(conn: &DatabaseConnection) -> Result<u64, NoteError> {
    Ok(note::Entity::find().count(conn).await?)
}

/// Delete a note, handing back the row so the caller can clean up its file
pub async fn delete_note(
    conn: &DatabaseConnection,
    id: i64,
) -> Result<Option<note::Model>, NoteError> {
    let Some(model) = find_note(conn, id).await? else {
        return Ok(None);
    };

    let res = note::Entity::delete_by_id(id).exec(conn).await?;
    if res.rows_affected == 0 {
        // somebody else got there first
        return Ok(None);
    }

    Ok(Some(model))
}

/// Case-insensitive substring match over content, tags and the original filename
///
/// SQLite's `lower()` only folds ASCII, so the term is folded the same way.
fn search_condition(term: &str) -> Condition {
    let pattern = format!("%{}%", escape_like(&term.to_ascii_lowercase()));

    [
        note::Column::Content,
        note::Column::Tags,
        note::Column::FileName,
    ]
    .into_iter()
    .fold(Condition::any(), |condition, column| {
        condition.add(
            Expr::expr(Func::lower(Expr::col(column)))
                .like(LikeExpr::new(pattern.clone()).escape('\\')),
        )
    })
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
