// ==========================================
// Excel 汇总工具 - 源文件定位
// ==========================================
// 职责: (显式文件夹 | 默认文件夹) + 文件名 → 源文件路径
// 规则:
// 1. 显式文件夹非空且合法: 只检查 <文件夹>/<文件名>,不递归,不回退
// 2. 否则默认文件夹非空: 递归搜索整棵子树,首个同名文件胜出
// 3. 文件名含非法字符: 直接视为未找到
// ==========================================

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// 文件名非法字符（随宿主文件系统）
#[cfg(windows)]
const INVALID_FILE_NAME_CHARS: &[char] = &['"', '<', '>', '|', ':', '*', '?', '\\', '/'];
#[cfg(not(windows))]
const INVALID_FILE_NAME_CHARS: &[char] = &['/'];

/// 路径非法字符（随宿主文件系统）
#[cfg(windows)]
const INVALID_PATH_CHARS: &[char] = &['"', '<', '>', '|'];
#[cfg(not(windows))]
const INVALID_PATH_CHARS: &[char] = &[];

/// 文件名是否合法（非空白,无非法字符/控制字符）
pub fn is_valid_file_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name
            .chars()
            .any(|c| c == '\0' || c.is_control() || INVALID_FILE_NAME_CHARS.contains(&c))
}

/// 路径是否合法（非空白,无非法字符/控制字符）
pub fn is_valid_path(path: &str) -> bool {
    !path.trim().is_empty()
        && !path
            .chars()
            .any(|c| c == '\0' || c.is_control() || INVALID_PATH_CHARS.contains(&c))
}

/// 文件名比较（大小写敏感性随宿主文件系统）
fn names_match(candidate: &OsStr, wanted: &str) -> bool {
    match candidate.to_str() {
        #[cfg(windows)]
        Some(name) => name.to_lowercase() == wanted.to_lowercase(),
        #[cfg(not(windows))]
        Some(name) => name == wanted,
        None => false,
    }
}

/// 转为绝对路径（失败时原样返回）
fn to_absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

// ==========================================
// FileResolver - 源文件定位器
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct FileResolver;

impl FileResolver {
    pub fn new() -> Self {
        Self
    }

    /// 定位源文件
    ///
    /// # 参数
    /// - explicit_folder: 指令 A 列文件夹（None/空白表示未指定）
    /// - file_name: 指令 B 列文件名
    /// - default_folder: 控制表 B1 默认文件夹
    ///
    /// # 返回
    /// - Some(PathBuf): 源文件绝对路径
    /// - None: 未找到
    pub fn resolve(
        &self,
        explicit_folder: Option<&str>,
        file_name: &str,
        default_folder: &str,
    ) -> Option<PathBuf> {
        let file_name = file_name.trim();
        if !is_valid_file_name(file_name) {
            debug!(file_name = %file_name, "文件名含非法字符");
            return None;
        }

        let explicit = explicit_folder.map(str::trim).filter(|f| !f.is_empty());
        match explicit {
            Some(folder) if is_valid_path(folder) => {
                let candidate = Path::new(folder).join(file_name);
                if candidate.is_file() {
                    Some(to_absolute(candidate))
                } else {
                    debug!(path = %candidate.display(), "显式路径下文件不存在");
                    None
                }
            }
            _ => {
                let default_folder = default_folder.trim();
                if default_folder.is_empty() {
                    return None;
                }
                self.search_recursive(Path::new(default_folder), file_name)
                    .map(to_absolute)
            }
        }
    }

    /// 递归搜索（深度优先,同级按文件名排序,不可读目录跳过）
    pub fn search_recursive(&self, root: &Path, file_name: &str) -> Option<PathBuf> {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .find(|entry| entry.file_type().is_file() && names_match(entry.file_name(), file_name))
            .map(|entry| entry.into_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_explicit_folder_wins() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("explicit");
        let default = dir.path().join("default");
        touch(&explicit.join("a.xlsx"));
        touch(&default.join("nested").join("a.xlsx"));

        let resolver = FileResolver::new();
        let found = resolver
            .resolve(explicit.to_str(), "a.xlsx", default.to_str().unwrap())
            .unwrap();
        assert_eq!(found, to_absolute(explicit.join("a.xlsx")));
    }

    #[test]
    fn test_explicit_folder_never_falls_back_to_search() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("explicit");
        let default = dir.path().join("default");
        fs::create_dir_all(&explicit).unwrap();
        touch(&default.join("a.xlsx"));

        let resolver = FileResolver::new();
        assert_eq!(
            resolver.resolve(explicit.to_str(), "a.xlsx", default.to_str().unwrap()),
            None
        );
    }

    #[test]
    fn test_default_folder_recursive_search() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("region").join("deep").join("sales.xlsx"));

        let resolver = FileResolver::new();
        let found = resolver
            .resolve(None, "sales.xlsx", dir.path().to_str().unwrap())
            .unwrap();
        assert!(found.ends_with("region/deep/sales.xlsx"));
        assert!(found.is_absolute());

        // 空白显式文件夹等同未指定
        assert!(resolver
            .resolve(Some("   "), "sales.xlsx", dir.path().to_str().unwrap())
            .is_some());
    }

    #[test]
    fn test_first_match_in_traversal_order() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("b").join("x.csv"));
        touch(&dir.path().join("a").join("x.csv"));

        let found = FileResolver::new().search_recursive(dir.path(), "x.csv").unwrap();
        assert!(found.ends_with("a/x.csv"));
    }

    #[test]
    fn test_not_found_cases() {
        let dir = TempDir::new().unwrap();
        let resolver = FileResolver::new();
        assert_eq!(resolver.resolve(None, "missing.xlsx", dir.path().to_str().unwrap()), None);
        assert_eq!(resolver.resolve(None, "a.xlsx", ""), None);
        assert_eq!(resolver.resolve(None, "bad/name.xlsx", dir.path().to_str().unwrap()), None);
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_file_name("отчёт 2024.xlsx"));
        assert!(!is_valid_file_name("   "));
        assert!(!is_valid_file_name("a\0b"));
        assert!(!is_valid_file_name("a/b.xlsx"));
        assert!(is_valid_path("/data/projects"));
        assert!(!is_valid_path("/data/\u{1}bad"));
    }
}
