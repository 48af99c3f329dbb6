//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Fake tiling tools written as shell scripts
//! - Input images and zip bundles
//! - Reading back the produced archive

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipArchive;

use slidetiler::config::Config;
use slidetiler::invoker::Transport;
use slidetiler::log::{LogLevel, Logger};
use slidetiler::TilingRun;

/// What the fake tool does for every image.
pub enum ToolBehavior {
    /// Write these tiles into `<output>/<stem>/<stem>_tiles/`.
    /// `{stem}` in a name is replaced by the image stem.
    Tiles(Vec<&'static str>),
    /// Write these tiles straight into `<output>/`, for the flat layout.
    Flat(Vec<&'static str>),
    /// Write `<stem>_000.png` .. `<stem>_<n-1>.png`, zero-padded to three digits.
    Numbered(usize),
    /// Print `message` on stderr and exit with `code`.
    Fail { code: i32, message: &'static str },
    /// Create the tile directory but leave it empty.
    NoTiles,
    /// Sleep, then write tiles like `Tiles`.
    Slow {
        seconds: &'static str,
        tiles: Vec<&'static str>,
    },
}

/// A scratch area holding the fake tool, inputs, and the output archive.
pub struct TestBench {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub script: PathBuf,
    /// Every invocation appends the image path here.
    pub calls: PathBuf,
    pub logger: Logger,
}

impl TestBench {
    pub fn new(behavior: ToolBehavior) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        let calls = root.join("calls.log");
        let script = root.join("tool").join("fake_pyhist.sh");
        fs::create_dir_all(script.parent().unwrap()).unwrap();
        fs::write(&script, script_body(&behavior, &calls)).expect("Failed to write fake tool");

        Self {
            temp_dir,
            root,
            script,
            calls,
            logger: Logger::memory(LogLevel::Info),
        }
    }

    /// Config running the fake tool through `sh`, starting from a fresh archive.
    pub fn config(&self, max_workers: usize) -> Config {
        Config {
            transport: Transport::Local {
                interpreter: "sh".to_string(),
                script: self.script.clone(),
            },
            max_workers: Some(max_workers),
            fresh_archive: true,
            ..Config::default()
        }
    }

    pub fn run(&self, config: Config) -> TilingRun {
        TilingRun::new(config, self.logger.clone(), &self.root)
    }

    /// Create an input image at `<root>/<rel>`.
    pub fn image(&self, rel: &str) -> PathBuf {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"fake slide").expect("Failed to write image");
        path
    }

    /// Create a zip bundle at `<root>/<rel>` with the given entry names.
    pub fn bundle(&self, rel: &str, entries: &[&str]) -> PathBuf {
        let path = self.root.join(rel);
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        for name in entries {
            zip.start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"fake slide").unwrap();
        }
        zip.finish().unwrap();
        path
    }

    pub fn output_zip(&self) -> PathBuf {
        self.root.join("out").join("tiles.zip")
    }

    /// Image paths the fake tool was called with, in call order.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(&self.calls)
            .map(|s| s.lines().map(String::from).collect())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.logger
            .records_at(LogLevel::Error)
            .into_iter()
            .map(|r| r.message)
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.logger
            .records_at(LogLevel::Warn)
            .into_iter()
            .map(|r| r.message)
            .collect()
    }
}

/// Sorted entry names of the archive at `path`.
pub fn archive_entries(path: &Path) -> Vec<String> {
    let archive = ZipArchive::new(File::open(path).expect("archive should exist"))
        .expect("archive should be a valid zip");
    let mut names: Vec<String> = archive.file_names().map(String::from).collect();
    names.sort();
    names
}

fn tile_lines(tiles: &[&str]) -> String {
    tiles
        .iter()
        .map(|t| {
            let name = t.replace("{stem}", "${stem}");
            format!("printf '%s' \"$stem\" > \"$tiles/{}.png\"\n", name)
        })
        .collect()
}

fn script_body(behavior: &ToolBehavior, calls: &Path) -> String {
    let mut body = format!(
        r#"out=""
img=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    *) img="$1"; shift ;;
  esac
done
echo "$img" >> '{}'
name=$(basename "$img")
stem="${{name%.*}}"
tiles="$out/$stem/${{stem}}_tiles"
"#,
        calls.display()
    );

    match behavior {
        ToolBehavior::Tiles(tiles) => {
            body.push_str("mkdir -p \"$tiles\"\n");
            body.push_str(&tile_lines(tiles));
        }
        ToolBehavior::Flat(tiles) => {
            body.push_str("tiles=\"$out\"\nmkdir -p \"$tiles\"\n");
            body.push_str(&tile_lines(tiles));
        }
        ToolBehavior::Numbered(count) => {
            body.push_str("mkdir -p \"$tiles\"\n");
            body.push_str(&format!(
                r#"i=0
while [ $i -lt {} ]; do
  printf '%s' "$stem" > "$tiles/${{stem}}_$(printf '%03d' $i).png"
  i=$((i + 1))
done
"#,
                count
            ));
        }
        ToolBehavior::Fail { code, message } => {
            body.push_str(&format!("echo '{}' >&2\nexit {}\n", message, code));
        }
        ToolBehavior::NoTiles => body.push_str("mkdir -p \"$tiles\"\n"),
        ToolBehavior::Slow { seconds, tiles } => {
            body.push_str(&format!("sleep {}\n", seconds));
            body.push_str("mkdir -p \"$tiles\"\n");
            body.push_str(&tile_lines(tiles));
        }
    }
    body
}
