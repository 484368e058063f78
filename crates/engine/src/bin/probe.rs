use std::path::PathBuf;

use anyhow::Context as _;
use engine::{Engine, count_pages, inspect_path, read_document};
use scanner_core::{Content, DocumentId, UploadedDocument};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let mut file_path: Option<PathBuf> = None;
    let mut page_number: u32 = 1;
    let mut rasterize = false;

    let mut args = std::env::args_os().skip(1);
    while let Some(arg) = args.next() {
        let arg_str = arg.to_string_lossy();
        match arg_str.as_ref() {
            "--file" => {
                let value = args.next().context("missing value for --file")?;
                file_path = Some(PathBuf::from(value));
            }
            "--page" => {
                let value = args.next().context("missing value for --page")?;
                let value_str = value.to_string_lossy();
                page_number = value_str
                    .parse::<u32>()
                    .with_context(|| format!("invalid --page value: {value_str}"))?;
                if page_number == 0 {
                    anyhow::bail!("--page must be >= 1");
                }
            }
            "--rasterize" => rasterize = true,
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            other => anyhow::bail!("unknown arg: {other} (try --help)"),
        }
    }

    let file_path = file_path.context("missing --file (try --help)")?;
    let selected = inspect_path(&file_path);
    let document = UploadedDocument::from_selection(DocumentId(1), selected);
    println!(
        "file: {} ({} bytes, {}, mode={})",
        document.name, document.size_bytes, document.media_type, document.mode
    );

    let content = read_document(&document)?;
    let bytes = match content {
        Content::Text(text) => {
            println!("text: ok ({} chars)", text.chars().count());
            for line in text.lines().take(10) {
                println!("  {line}");
            }
            return Ok(());
        }
        Content::Binary(bytes) => bytes,
    };

    let pages = count_pages(&bytes).context("open document")?;
    println!("pdf: ok (pages={pages})");
    if page_number > pages {
        anyhow::bail!("page {page_number} out of range (1..={pages})");
    }

    let engine = Engine::new();
    let page_index = page_number - 1;
    if rasterize {
        let bitmap = engine
            .render_page_bitmap_rgba(&bytes, page_index, 1.0)
            .with_context(|| format!("render page {page_number}"))?;
        println!(
            "render: ok (page={} {}x{})",
            page_number, bitmap.width, bitmap.height
        );
    }

    let text = engine
        .page_text(&bytes, page_index)
        .with_context(|| format!("extract text of page {page_number}"))?;
    println!("page {page_number} text:");
    for line in text.lines().take(20) {
        println!("  {line}");
    }
    Ok(())
}

fn print_help() {
    println!(
        "\
probe

Runs one file through classification, loading and page counting without
starting the terminal UI.

Usage:
  cargo run -p engine --bin probe -- --file <path>

Options:
  --file <path>   File to inspect (.pdf is opened as a document, anything else as text)
  --page <n>      Page to extract (1-based, default: 1)
  --rasterize     Also draw the page with pdfium
  --help          Show this help
"
    );
}
