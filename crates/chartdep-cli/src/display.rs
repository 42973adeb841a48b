//! Table output for `repo list` and `dependency list`

use chartdep_repo::{DependencyStatus, Repository, RepositoryType, StatusEntry};
use console::style;

fn repo_type(repo: &Repository) -> &'static str {
    match repo.repo_type {
        RepositoryType::Http => "http",
        RepositoryType::File => "file",
    }
}

pub fn repository_table(repos: &[Repository]) -> String {
    let mut out = format!("{:<20} {:<6} {}\n", "NAME", "TYPE", "URL");
    for repo in repos {
        out.push_str(&format!("{:<20} {:<6} {}\n", repo.name, repo_type(repo), repo.url));
    }
    out
}

/// Status cell, colored when the terminal supports it
fn status_cell(status: &DependencyStatus) -> String {
    let text = status.to_string();
    match status {
        DependencyStatus::Ok { .. } => style(text).green().to_string(),
        DependencyStatus::Missing | DependencyStatus::Corrupt { .. } => style(text).red().to_string(),
        DependencyStatus::WrongVersion { .. } | DependencyStatus::Unpacked => {
            style(text).yellow().to_string()
        }
    }
}

pub fn status_table(entries: &[StatusEntry]) -> String {
    let mut out = format!(
        "{:<24} {:<16} {:<40} {}\n",
        "NAME", "VERSION", "REPOSITORY", "STATUS"
    );
    for entry in entries {
        out.push_str(&format!(
            "{:<24} {:<16} {:<40} {}\n",
            entry.name,
            entry.version,
            entry.repository,
            status_cell(&entry.status)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        console::set_colors_enabled(false);
        let entries = vec![
            StatusEntry {
                name: "reqtest".to_string(),
                version: "0.1.0".to_string(),
                repository: "@test".to_string(),
                status: DependencyStatus::Ok {
                    version: "0.1.0".to_string(),
                },
            },
            StatusEntry {
                name: "compressedchart".to_string(),
                version: "0.3.0".to_string(),
                repository: "@test".to_string(),
                status: DependencyStatus::Missing,
            },
        ];

        let table = status_table(&entries);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[1].starts_with("reqtest") && lines[1].ends_with("ok"));
        assert!(lines[2].ends_with("missing"));
    }

    #[test]
    fn test_repository_table() {
        let repos = vec![Repository::new("test", "http://127.0.0.1:8879").unwrap()];
        let table = repository_table(&repos);
        assert!(table.contains("test"));
        assert!(table.contains("http://127.0.0.1:8879"));
    }
}
