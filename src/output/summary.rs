use std::fmt::Write;
use std::path::Path;

use comfy_table::Cell;

use super::styling::{bright, cyan, dim};
use super::tables::{create_table, format_size, header_cells, size_cell};
use crate::orchestrator::SavedArtifact;

/// Prints the downloaded artifacts to stdout, one row per job.
pub fn print_summary(artifacts: &[SavedArtifact], folder: &Path) {
    println!("{}", render_summary(artifacts, folder));
}

fn render_summary(artifacts: &[SavedArtifact], folder: &Path) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{} {}", bright("📦"), bright("Artifacts").underlined());

    let mut sorted: Vec<&SavedArtifact> = artifacts.iter().collect();
    sorted.sort_by(|a, b| a.job_name.cmp(&b.job_name));

    let mut table = create_table();
    table.set_header(header_cells(&["Job", "File", "Size"]));
    for artifact in &sorted {
        let file = artifact
            .path
            .strip_prefix(folder)
            .unwrap_or(&artifact.path)
            .display()
            .to_string();
        table.add_row(vec![
            Cell::new(&artifact.job_name),
            Cell::new(file),
            size_cell(artifact.size),
        ]);
    }

    let total: usize = artifacts.iter().map(|artifact| artifact.size).sum();
    let _ = writeln!(output, "{table}");
    let _ = writeln!(
        output,
        "  {} {}  {} {}",
        dim("Folder:"),
        cyan(folder.display()),
        dim("Total:"),
        cyan(format_size(total))
    );

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(folder: &Path, name: &str, size: usize) -> SavedArtifact {
        SavedArtifact {
            job_name: name.to_string(),
            path: folder.join(format!("{name}.zip")),
            size,
        }
    }

    #[test]
    fn test_render_summary_lists_every_artifact() {
        let folder = Path::new("out");
        let artifacts = vec![saved(folder, "test", 2048), saved(folder, "build", 10)];

        let output = render_summary(&artifacts, folder);

        assert!(output.contains("Artifacts"));
        assert!(output.contains("build.zip"));
        assert!(output.contains("test.zip"));
        assert!(output.contains("2.0 KiB"));
        assert!(output.contains("10 B"));
        assert!(output.contains("Total:"));
    }

    #[test]
    fn test_render_summary_sorts_by_job_name() {
        let folder = Path::new("out");
        let artifacts = vec![saved(folder, "zeta", 1), saved(folder, "alpha", 1)];

        let output = render_summary(&artifacts, folder);

        let alpha = output.find("alpha").unwrap();
        let zeta = output.find("zeta").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_render_summary_total_size() {
        let folder = Path::new("out");
        let artifacts = vec![saved(folder, "a", 1024), saved(folder, "b", 1024)];

        let output = render_summary(&artifacts, folder);

        assert!(output.contains("2.0 KiB"));
    }
}
