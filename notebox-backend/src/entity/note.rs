use chrono::Utc;
use notebox_shared::note::{file_url, split_tags, Note, NoteType};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub note_type: NoteType,
    pub content: Option<String>,
    pub file_name: Option<String>,
    /// Generated name relative to the uploads directory
    pub file_path: Option<String>,
    pub mime_type: Option<String>,
    pub tags: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Note {
    fn from(model: Model) -> Self {
        Note {
            tag_list: model.tags.as_deref().map(split_tags).unwrap_or_default(),
            file_url: model.file_path.as_deref().map(file_url),
            id: model.id,
            note_type: model.note_type,
            content: model.content,
            file_name: model.file_name,
            file_path: model.file_path,
            mime_type: model.mime_type,
            tags: model.tags,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
