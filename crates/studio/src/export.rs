use ai_pipeline::AssetHandle;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prompt characters kept in an export file name
const NAME_PREFIX_CHARS: usize = 20;

/// `{first 20 prompt chars, non-alphanumerics as '_'}.{jpg|mp4}`, or
/// `asset_{index}` when the prompt is empty
pub fn export_file_name(asset: &AssetHandle, index: usize) -> String {
    let stem: String = asset
        .prompt
        .chars()
        .take(NAME_PREFIX_CHARS)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() {
        format!("asset_{}", index)
    } else {
        stem
    };
    format!("{}.{}", stem, asset.kind.extension())
}

/// Write every asset into `dir`; colliding names get a numeric suffix
pub fn export_assets(assets: &[AssetHandle], dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

    let mut taken = HashSet::new();
    let mut written = Vec::with_capacity(assets.len());

    for (index, asset) in assets.iter().enumerate() {
        let name = unique_name(&export_file_name(asset, index), &mut taken);
        let path = dir.join(&name);
        fs::write(&path, &asset.bytes).with_context(|| format!("write {}", path.display()))?;
        written.push(path);
    }

    info!(count = written.len(), dir = %dir.display(), "exported assets");
    Ok(written)
}

fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let mut n = 1;
    loop {
        let candidate = format!("{}_{}.{}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_follow_prompt() {
        let image = AssetHandle::image("A cat, on a mat! (retro style)", vec![1], "image/jpeg");
        assert_eq!(export_file_name(&image, 0), "A_cat__on_a_mat___re.jpg");

        let video = AssetHandle::video("", vec![2], "video/mp4", "file:///v.mp4".into(), None);
        assert_eq!(export_file_name(&video, 3), "asset_3.mp4");
    }

    #[test]
    fn export_deduplicates_names() {
        let dir = tempfile::tempdir().unwrap();
        let assets = vec![
            AssetHandle::image("A cat", vec![1], "image/jpeg"),
            AssetHandle::image("A cat", vec![2], "image/jpeg"),
            AssetHandle::image("A cat", vec![3], "image/jpeg"),
        ];

        let written = export_assets(&assets, &dir.path().join("out")).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A_cat.jpg", "A_cat_1.jpg", "A_cat_2.jpg"]);
        assert_eq!(fs::read(&written[2]).unwrap(), vec![3]);
    }
}
