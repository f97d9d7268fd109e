use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tracing::{info, warn};

use bm_common::analysis::{AnalyzerConfig, GeminiClient};
use bm_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use bm_common::queue::{AnalysisQueue, BookRequest, ProcessingCounter};
use bm_common::run_id;
use bm_common::store::{
    LibraryStore, PgStore, ProfileStore, create_pool_from_url_checked, run_migrations,
};

type BoxError = Box<dyn Error + Send + Sync>;

const DEFAULT_METRICS_PORT: u16 = 9465;

#[derive(Debug, Parser)]
#[command(
    name = "bm-analysis-worker",
    about = "Analyse a batch of books for one user and update their library"
)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    db_url: String,

    /// Owner of the books
    #[arg(long)]
    user_id: String,

    /// Book as "Title" or "Title|Author" (repeatable)
    #[arg(long = "book", value_parser = parse_book_arg)]
    books: Vec<BookRequest>,

    /// JSON file with an array of {"title", "author"} objects
    #[arg(long)]
    books_file: Option<PathBuf>,

    /// Apply pending schema migrations before processing
    #[arg(long, default_value_t = false)]
    run_migrations: bool,
}

fn parse_book_arg(raw: &str) -> Result<BookRequest, String> {
    let (title, author) = match raw.split_once('|') {
        Some((title, author)) => (title.trim(), Some(author.trim())),
        None => (raw.trim(), None),
    };

    if title.is_empty() {
        return Err(format!("book title is empty in {raw:?}"));
    }

    Ok(BookRequest {
        title: title.to_string(),
        author: author.filter(|a| !a.is_empty()).map(str::to_string),
    })
}

fn parse_books_json(contents: &str) -> Result<Vec<BookRequest>, BoxError> {
    let books: Vec<BookRequest> = serde_json::from_str(contents)?;
    Ok(books
        .into_iter()
        .map(|book| BookRequest {
            title: book.title.trim().to_string(),
            author: book
                .author
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
        })
        .filter(|book| !book.title.is_empty())
        .collect())
}

async fn load_books_file(path: &Path) -> Result<Vec<BookRequest>, BoxError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    parse_books_json(&contents)
}

async fn run() -> Result<(), BoxError> {
    dotenv().ok();
    init_tracing_subscriber(env!("CARGO_PKG_NAME"));
    install_tracing_panic_hook(env!("CARGO_PKG_NAME"));

    let args = Cli::parse();

    let mut books = args.books.clone();
    if let Some(path) = args.books_file.as_deref() {
        books.extend(load_books_file(path).await?);
    }
    if books.is_empty() {
        warn!("no books given; nothing to do");
        return Ok(());
    }

    if std::env::var_os("BM_METRICS_PORT").is_some() {
        bm_metrics::init_metrics("BM_METRICS_PORT", DEFAULT_METRICS_PORT);
    }

    let analyzer = Arc::new(GeminiClient::new(AnalyzerConfig::from_env())?);

    let pool = create_pool_from_url_checked(&args.db_url).await?;
    if args.run_migrations {
        run_migrations(&pool).await?;
    }
    let store: Arc<dyn LibraryStore> = Arc::new(PgStore::new(pool));

    info!(
        run_id = run_id::get(),
        user_id = %args.user_id,
        books = books.len(),
        model = analyzer.model(),
        "starting analysis batch"
    );

    let logs_before = store.get_activity_logs(&args.user_id).await?.len();

    let counter = ProcessingCounter::new();
    let queue = AnalysisQueue::spawn(analyzer, store.clone(), counter.clone());

    let mut progress = counter.subscribe();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let remaining = *progress.borrow_and_update();
            info!(remaining, "analysis progress");
            if remaining == 0 {
                break;
            }
        }
    });

    let total = books.len();
    let receipt = queue.enqueue(&args.user_id, books)?;
    counter.wait_idle().await;
    let _ = reporter.await;

    let saved = store
        .get_activity_logs(&args.user_id)
        .await?
        .len()
        .saturating_sub(logs_before);

    info!(
        batch_id = %receipt.batch_id,
        submitted = total,
        saved,
        skipped = total.saturating_sub(saved),
        "analysis batch finished"
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("bm-analysis-worker failed: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_arg_splits_title_and_author() {
        let book = parse_book_arg(" イシューからはじめよ | 安宅和人 ").unwrap();
        assert_eq!(book.title, "イシューからはじめよ");
        assert_eq!(book.author.as_deref(), Some("安宅和人"));
    }

    #[test]
    fn book_arg_without_author() {
        let book = parse_book_arg("Zero to One").unwrap();
        assert_eq!(book.author, None);

        let book = parse_book_arg("Zero to One|").unwrap();
        assert_eq!(book.author, None);
    }

    #[test]
    fn book_arg_rejects_empty_title() {
        assert!(parse_book_arg(" |someone").is_err());
    }

    #[test]
    fn books_json_skips_blank_titles() {
        let books =
            parse_books_json(r#"[{"title":"7つの習慣","author":"コヴィー"},{"title":"  "},{"title":"FACTFULNESS"}]"#)
                .unwrap();

        assert_eq!(books.len(), 2);
        assert_eq!(books[1].title, "FACTFULNESS");
        assert_eq!(books[1].author, None);
    }

    #[test]
    fn cli_collects_repeated_books() {
        let cli = Cli::try_parse_from([
            "bm-analysis-worker",
            "--db-url",
            "postgres://localhost/bm",
            "--user-id",
            "u1",
            "--book",
            "A|X",
            "--book",
            "B",
        ])
        .unwrap();

        assert_eq!(cli.books.len(), 2);
        assert_eq!(cli.books[0].author.as_deref(), Some("X"));
        assert!(!cli.run_migrations);
    }
}
