//! Self-describing binary values.
//!
//! A [`Note`] is a byte buffer plus a [`ByteDecoding`] tag. Composites are
//! notes whose buffer holds length-prefixed frames: [`NoteList`] for single
//! values and [`NoteMap`] for key/value [`NotePair`]s.
//!
//! ```
//! use nv_core::{Note, NoteMap};
//!
//! let mut map = NoteMap::new();
//! map.add_text("a", "1").unwrap();
//! map.add_text("a", "2").unwrap();
//! assert_eq!(map.size().unwrap(), 2);
//! assert_eq!(map.get_value(&Note::text("a")).unwrap(), Some(Note::text("1")));
//! ```

mod decoding;
mod error;
pub mod frame;
mod id;
mod list;
mod map;
mod note;
mod pair;
mod pairs;

pub use decoding::ByteDecoding;
pub use error::NoteError;
pub use id::IdGenerator;
pub use list::NoteList;
pub use map::{NoteMap, PairIter};
pub use note::Note;
pub use pair::NotePair;
pub use pairs::OrderedPairs;

pub type NoteResult<T> = Result<T, NoteError>;
