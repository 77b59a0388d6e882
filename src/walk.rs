use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Every directory strictly under `root`, relative to `root`,
/// depth-first, parents before children. Symlinks are not followed.
pub fn walk_dirs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk_dirs_into(root, Path::new(""), &mut out)?;
    Ok(out)
}

fn walk_dirs_into(root: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let abs = root.join(rel);
    let mut children: Vec<_> = fs::read_dir(&abs)?.collect::<io::Result<Vec<_>>>()?;
    children.sort_by_key(|e| e.file_name());
    for entry in children {
        let meta = entry.metadata()?;
        if meta.is_dir() {
            let child_rel = rel.join(entry.file_name());
            out.push(child_rel.clone());
            walk_dirs_into(root, &child_rel, out)?;
        }
    }
    Ok(())
}

/// Every regular file strictly under `root`, relative to `root`,
/// depth-first. Symlinks are not followed.
pub fn walk_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk_files_into(root, Path::new(""), &mut out)?;
    Ok(out)
}

fn walk_files_into(root: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let abs = root.join(rel);
    let mut children: Vec<_> = fs::read_dir(&abs)?.collect::<io::Result<Vec<_>>>()?;
    children.sort_by_key(|e| e.file_name());
    for entry in children {
        let meta = entry.metadata()?;
        let child_rel = rel.join(entry.file_name());
        if meta.is_dir() {
            walk_files_into(root, &child_rel, out)?;
        } else if meta.is_file() {
            out.push(child_rel);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};

    #[test]
    fn test_walk_dirs_and_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        create_dir_all(root.join("dir1/dir2")).unwrap();
        write(root.join("file1.txt"), b"a").unwrap();
        write(root.join("dir1/file2.txt"), b"b").unwrap();
        write(root.join("dir1/dir2/file3.txt"), b"c").unwrap();

        let dirs = walk_dirs(root).unwrap();
        assert_eq!(dirs, vec![PathBuf::from("dir1"), PathBuf::from("dir1/dir2")]);

        let mut files = walk_files(root).unwrap();
        files.sort();
        let mut expected = vec![
            PathBuf::from("file1.txt"),
            PathBuf::from("dir1/file2.txt"),
            PathBuf::from("dir1/dir2/file3.txt"),
        ];
        expected.sort();
        assert_eq!(files, expected);
    }
}
