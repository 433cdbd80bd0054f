// Atomic JSON file operations

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

lazy_static::lazy_static! {
    static ref FILE_LOCK: Mutex<()> = Mutex::new(());
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File not found: {0:?}")]
    NotFound(PathBuf),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let _lock = FILE_LOCK.lock();

    if !path.exists() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }

    let mut file = File::open(path).map_err(io_error(path))?;

    let mut contents = String::new();
    file.read_to_string(&mut contents).map_err(io_error(path))?;

    serde_json::from_str(&contents).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes JSON atomically using write-to-temp-then-rename
pub fn write_json_file<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    let _lock = FILE_LOCK.lock();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let json_string = serde_json::to_string_pretty(data).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let temp_path = path.with_extension("tmp");

    let mut temp_file = File::create(&temp_path).map_err(io_error(&temp_path))?;
    temp_file
        .write_all(json_string.as_bytes())
        .map_err(io_error(&temp_path))?;
    temp_file.sync_all().map_err(io_error(&temp_path))?;

    fs::rename(&temp_path, path).map_err(io_error(path))?;

    Ok(())
}

pub fn read_json_file_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    if path.exists() {
        read_json_file(path)
    } else {
        Ok(T::default())
    }
}
