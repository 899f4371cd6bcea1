use std::path::PathBuf;

use hashbrown::HashMap;

use crate::types::PhotoId;

pub type VecIndex<K> = HashMap<K, Vec<PhotoId>>;

pub type FolderIndex = VecIndex<PathBuf>;
