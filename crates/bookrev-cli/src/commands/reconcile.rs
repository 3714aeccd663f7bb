use bookrev_types::config::BackendConfig;
use clap::Parser;

use crate::commands::{open_db, Executor};

#[derive(Parser, Debug)]
pub struct ReconcileCmd {
    #[command(flatten)]
    backend: BackendConfig,
    #[arg(long, help = "Recompute only this book, even if its rating looks consistent")]
    book: Option<i64>,
}

impl Executor for ReconcileCmd {
    async fn run(self) -> anyhow::Result<()> {
        let pool = open_db(&self.backend).await?;
        match self.book {
            Some(book_id) => {
                let stats = bookrev_dal::rating::recompute_from_scratch(book_id, &pool)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Book {book_id} not found"))?;
                println!(
                    "Book {book_id}: average {:.2} from {} reviews",
                    stats.average_rating, stats.total_reviews
                );
            }
            None => {
                let fixed = bookrev_dal::rating::reconcile_all(&pool).await?;
                if fixed.is_empty() {
                    println!("All book ratings are consistent");
                } else {
                    println!("Fixed rating of {} books: {fixed:?}", fixed.len());
                }
            }
        }
        Ok(())
    }
}
