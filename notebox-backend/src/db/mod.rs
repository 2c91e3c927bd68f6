//! Queries against the `notes` table
//!

mod note;

pub use note::{
    count_notes, delete_note, find_note, find_note_by_file_path, insert_notes, list_notes,
    NewNote,
};
