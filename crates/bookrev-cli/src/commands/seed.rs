use bookrev_dal::{
    book::CreateBook,
    catalog::Catalog,
    lifecycle::ReviewLifecycle,
    review::CreateReview,
    user::{CreateUser, UserRepository},
};
use bookrev_types::{
    claim::{ApiClaim, Role},
    config::BackendConfig,
    general::ValidEmail,
};
use clap::Parser;
use tracing::info;

use crate::commands::{open_db, Executor};

struct SampleBook {
    title: &'static str,
    author: &'static str,
    description: &'static str,
    cover_image: &'static str,
}

const SAMPLE_BOOKS: &[SampleBook] = &[
    SampleBook {
        title: "To Kill a Mockingbird",
        author: "Harper Lee",
        description: "A novel about the serious issues of rape and racial inequality.",
        cover_image: "https://pictures.abebooks.com/inventory/22883965402.jpg",
    },
    SampleBook {
        title: "1984",
        author: "George Orwell",
        description: "A dystopian novel set in a totalitarian society ruled by Big Brother.",
        cover_image: "https://m.media-amazon.com/images/I/61NAx5pd6XL.jpg",
    },
    SampleBook {
        title: "The Hobbit",
        author: "J.R.R. Tolkien",
        description: "Bilbo Baggins embarks on an unexpected journey.",
        cover_image:
            "https://tse1.mm.bing.net/th/id/OIP.gSLel5r9Pf_E25NtSlvetwHaJ4?rs=1&pid=ImgDetMain",
    },
];

#[derive(Parser, Debug)]
pub struct SeedCmd {
    #[command(flatten)]
    backend: BackendConfig,
    #[arg(
        long,
        env = "BOOKREV_ADMIN_EMAIL",
        default_value = "admin@example.com",
        help = "Email of created admin user"
    )]
    admin_email: ValidEmail,
}

impl Executor for SeedCmd {
    async fn run(self) -> anyhow::Result<()> {
        let pool = open_db(&self.backend).await?;
        seed(&pool, self.admin_email).await
    }
}

pub(crate) async fn seed(pool: &bookrev_dal::Pool, admin_email: ValidEmail) -> anyhow::Result<()> {
    for table in ["review", "book", "users"] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(pool)
            .await?;
    }
    info!("Cleared existing data");

    let admin = UserRepository::new(pool.clone())
        .create(CreateUser {
            email: admin_email,
            name: "Admin".to_string(),
            avatar: None,
            role: Role::Admin,
        })
        .await?;
    println!("Created admin: {} (id {})", admin.email, admin.id);

    let actor = ApiClaim::new_expired(admin.id.to_string(), [Role::Admin]);
    let catalog = Catalog::new(pool.clone());
    let mut created = Vec::with_capacity(SAMPLE_BOOKS.len());
    for sample in SAMPLE_BOOKS {
        let book = catalog
            .create(
                &actor,
                CreateBook {
                    title: sample.title.to_string(),
                    author: sample.author.to_string(),
                    description: sample.description.to_string(),
                    genre: None,
                    published_year: None,
                    cover_image: Some(sample.cover_image.to_string()),
                    created_by: Some(actor.sub.clone()),
                },
            )
            .await?;
        created.push(book);
    }
    println!("Created {} sample books", created.len());

    if let Some(first) = created.first() {
        ReviewLifecycle::new(pool.clone())
            .create(
                admin.id,
                CreateReview {
                    book_id: first.id,
                    rating: 5,
                    comment: "An excellent and moving novel.".to_string(),
                },
            )
            .await?;
        println!("Created a sample review for {}", first.title);
    }

    Ok(())
}
