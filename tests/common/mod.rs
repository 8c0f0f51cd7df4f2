#![allow(dead_code)]

use memorm::prelude::*;

pub fn article_model() -> Model {
    Model::new("Article")
        .property(Property::serial("id"))
        .property(Property::string("title"))
        .property(Property::new("content", DataType::Text))
        .belongs_to("original", "Article", "original_id")
        .has_many("revisions", "Article", "original_id")
}

pub struct Fixture {
    pub db: Database,
    pub original: Resource,
    pub article: Resource,
    pub other: Resource,
    /// Scoped to `title = 'Sample Article'`; holds `article` only.
    pub articles: Collection,
    pub other_articles: Collection,
}

pub fn database(config: RepositoryConfig) -> Database {
    let db = Database::with_config(config);
    db.define(article_model()).unwrap();
    db
}

pub fn fixture_with(config: RepositoryConfig, loaded: bool) -> Fixture {
    let db = database(config);
    let original = db.create("Article", &attrs! { "title" => "Original Article" }).unwrap();
    let article = db
        .create(
            "Article",
            &attrs! {
                "title" => "Sample Article",
                "content" => "Sample",
                "original_id" => original.key().0[0].clone(),
            },
        )
        .unwrap();
    let other = db
        .create("Article", &attrs! { "title" => "Other Article", "content" => "Other Article" })
        .unwrap();

    let articles = db
        .all("Article", &QueryOptions::new().eq("title", "Sample Article"))
        .unwrap();
    let other_articles = db
        .all("Article", &QueryOptions::new().eq("title", "Other Article"))
        .unwrap();

    if loaded {
        articles.entries().unwrap();
        assert!(articles.is_loaded());
    }

    Fixture {
        db,
        original,
        article,
        other,
        articles,
        other_articles,
    }
}

pub fn fixture(loaded: bool) -> Fixture {
    fixture_with(RepositoryConfig::default(), loaded)
}

/// Runs `scenario` against an unloaded and then a loaded fixture.
pub fn both(scenario: impl Fn(Fixture)) {
    scenario(fixture(false));
    scenario(fixture(true));
}

/// Adds plain articles until the table holds `total` rows.
pub fn fill(db: &Database, total: usize) {
    let existing = db.gateway().row_count("Article");
    for n in existing..total {
        db.create("Article", &attrs! { "title" => format!("Filler {}", n) })
            .unwrap();
    }
}

pub fn titles(collection: &Collection) -> Vec<String> {
    collection
        .entries()
        .unwrap()
        .iter()
        .map(|resource| resource.get("title").unwrap().to_string())
        .collect()
}
