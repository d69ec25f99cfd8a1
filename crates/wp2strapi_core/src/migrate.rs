use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ResolvedSettings;
use crate::content::{article_excerpt, plain_excerpt, sanitize_html};
use crate::destination::{
    CreatedEntry, DestinationApi, DestinationArticle, DestinationCategory, DestinationCollection,
    DestinationPage, DestinationTour, RichTextBlock, StrapiClient,
};
use crate::media::{ImageMigrator, ImageStats};
use crate::source::{
    SourceApi, SourceCategory, SourcePage, SourcePost, SourceResource, WordPressClient, fetch_all,
};
use crate::tour::{PageKind, classify_page};

/// Source category id to destination category id. Filled by the category phase only.
pub type CategoryIdMap = BTreeMap<u64, u64>;

#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    pub source_id: u64,
    pub title: String,
    pub action: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseReport {
    pub fetched: usize,
    pub created: usize,
    pub failed: usize,
    pub tours: usize,
    pub errors: Vec<String>,
    pub items: Vec<ItemResult>,
}

impl PhaseReport {
    fn record_created(&mut self, source_id: u64, title: &str, action: &str, entry: &CreatedEntry) {
        self.created += 1;
        self.items.push(ItemResult {
            source_id,
            title: title.to_string(),
            action: action.to_string(),
            detail: Some(format!("destination id {}", entry.id)),
        });
    }

    fn record_failed(&mut self, source_id: u64, title: &str, error: &anyhow::Error) {
        let message = format!("{error:#}");
        self.failed += 1;
        self.errors.push(format!("{title} (#{source_id}): {message}"));
        self.items.push(ItemResult {
            source_id,
            title: title.to_string(),
            action: "error".to_string(),
            detail: Some(message),
        });
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub success: bool,
    pub categories: PhaseReport,
    pub posts: PhaseReport,
    pub pages: PhaseReport,
    pub images: ImageStats,
    pub source_requests: usize,
    pub destination_requests: usize,
}

pub fn run_migration(settings: &ResolvedSettings) -> Result<MigrationReport> {
    let mut source = WordPressClient::new(settings)?;
    let mut destination = StrapiClient::new(settings)?;
    Ok(run_migration_with_api(settings, &mut source, &mut destination))
}

/// Categories, then posts, then pages. Item failures are recorded and skipped.
pub fn run_migration_with_api<S, D>(
    settings: &ResolvedSettings,
    source: &mut S,
    destination: &mut D,
) -> MigrationReport
where
    S: SourceApi,
    D: DestinationApi,
{
    let mut images = ImageMigrator::new();
    let mut category_map = CategoryIdMap::new();

    let categories = migrate_categories(settings, source, destination, &mut category_map);
    let posts = migrate_posts(settings, source, destination, &mut images, &category_map);
    let pages = migrate_pages(settings, source, destination, &mut images);

    let success =
        categories.errors.is_empty() && posts.errors.is_empty() && pages.errors.is_empty();
    MigrationReport {
        success,
        categories,
        posts,
        pages,
        images: images.stats().clone(),
        source_requests: source.request_count(),
        destination_requests: destination.request_count(),
    }
}

pub fn migrate_categories<S, D>(
    settings: &ResolvedSettings,
    source: &mut S,
    destination: &mut D,
    category_map: &mut CategoryIdMap,
) -> PhaseReport
where
    S: SourceApi,
    D: DestinationApi,
{
    let categories: Vec<SourceCategory> =
        fetch_all(source, SourceResource::Categories, settings.per_page);
    let mut report = PhaseReport {
        fetched: categories.len(),
        ..PhaseReport::default()
    };
    info!(count = categories.len(), "migrating categories");

    for category in categories {
        let payload = DestinationCategory {
            name: category.name.clone(),
            slug: category.slug.clone(),
            description: category.description.clone(),
            wp_id: category.id,
        };
        match create_entry(destination, DestinationCollection::Categories, &payload) {
            Ok(entry) => {
                category_map.insert(category.id, entry.id);
                info!(
                    wp_id = category.id,
                    id = entry.id,
                    name = %category.name,
                    "created category"
                );
                report.record_created(category.id, &category.name, "created", &entry);
            }
            Err(error) => {
                warn!(
                    wp_id = category.id,
                    name = %category.name,
                    error = %format!("{error:#}"),
                    "failed to create category"
                );
                report.record_failed(category.id, &category.name, &error);
            }
        }
    }

    report
}

pub fn migrate_posts<S, D>(
    settings: &ResolvedSettings,
    source: &mut S,
    destination: &mut D,
    images: &mut ImageMigrator,
    category_map: &CategoryIdMap,
) -> PhaseReport
where
    S: SourceApi,
    D: DestinationApi,
{
    let posts: Vec<SourcePost> = fetch_all(source, SourceResource::Posts, settings.per_page);
    let mut report = PhaseReport {
        fetched: posts.len(),
        ..PhaseReport::default()
    };
    info!(count = posts.len(), "migrating posts");

    for post in posts {
        let title = post.title.rendered.clone();
        let cover = images
            .resolve_featured_media(post.featured_media_href(), source, destination)
            .map(|record| record.id);
        let content = clean_content(
            settings,
            &post.content.rendered,
            images,
            source,
            destination,
        );

        let mapped = post
            .categories
            .iter()
            .filter_map(|id| category_map.get(id).copied())
            .collect::<Vec<_>>();
        if mapped.len() > 1 {
            debug!(
                wp_id = post.id,
                kept = mapped[0],
                dropped = mapped.len() - 1,
                "article keeps only its first category"
            );
        }

        let payload = DestinationArticle {
            title: title.clone(),
            slug: post.slug.clone(),
            description: article_excerpt(&post.excerpt.rendered, settings.article_excerpt_chars),
            cover,
            category: mapped.first().copied(),
            blocks: vec![RichTextBlock::new(content)],
            wp_id: post.id,
        };
        match create_entry(destination, DestinationCollection::Articles, &payload) {
            Ok(entry) => {
                info!(wp_id = post.id, id = entry.id, %title, "created article");
                report.record_created(post.id, &title, "created", &entry);
            }
            Err(error) => {
                warn!(
                    wp_id = post.id,
                    %title,
                    error = %format!("{error:#}"),
                    "failed to create article"
                );
                report.record_failed(post.id, &title, &error);
            }
        }
    }

    report
}

pub fn migrate_pages<S, D>(
    settings: &ResolvedSettings,
    source: &mut S,
    destination: &mut D,
    images: &mut ImageMigrator,
) -> PhaseReport
where
    S: SourceApi,
    D: DestinationApi,
{
    let pages: Vec<SourcePage> = fetch_all(source, SourceResource::Pages, settings.per_page);
    let mut report = PhaseReport {
        fetched: pages.len(),
        ..PhaseReport::default()
    };
    info!(count = pages.len(), "migrating pages");

    for page in pages {
        let title = page.title.rendered.clone();
        let featured_image = images
            .resolve_featured_media(page.featured_media_href(), source, destination)
            .map(|record| record.id);
        let content = clean_content(
            settings,
            &page.content.rendered,
            images,
            source,
            destination,
        );
        let excerpt = plain_excerpt(&page.excerpt.rendered);

        let (result, action) = match classify_page(&page.content.rendered, &content) {
            PageKind::Tour { duration, distance } => {
                let payload = DestinationTour {
                    title: title.clone(),
                    slug: page.slug.clone(),
                    content,
                    excerpt,
                    featured_image,
                    duration,
                    distance,
                    wp_id: page.id,
                };
                (
                    create_entry(destination, DestinationCollection::Tours, &payload),
                    "created_tour",
                )
            }
            PageKind::Page => {
                let payload = DestinationPage {
                    title: title.clone(),
                    slug: page.slug.clone(),
                    content,
                    excerpt,
                    featured_image,
                    wp_id: page.id,
                };
                (
                    create_entry(destination, DestinationCollection::Pages, &payload),
                    "created_page",
                )
            }
        };

        match result {
            Ok(entry) => {
                if action == "created_tour" {
                    report.tours += 1;
                }
                info!(
                    wp_id = page.id,
                    id = entry.id,
                    %title,
                    action,
                    "created page record"
                );
                report.record_created(page.id, &title, action, &entry);
            }
            Err(error) => {
                warn!(
                    wp_id = page.id,
                    %title,
                    error = %format!("{error:#}"),
                    "failed to create page record"
                );
                report.record_failed(page.id, &title, &error);
            }
        }
    }

    report
}

fn clean_content<S, D>(
    settings: &ResolvedSettings,
    html: &str,
    images: &mut ImageMigrator,
    source: &mut S,
    destination: &mut D,
) -> String
where
    S: SourceApi,
    D: DestinationApi,
{
    sanitize_html(html, &settings.strip_attribute_prefixes, |src| {
        images.migrate(src, source, destination).map(|record| record.url)
    })
}

fn create_entry<D, T>(
    destination: &mut D,
    collection: DestinationCollection,
    payload: &T,
) -> Result<CreatedEntry>
where
    D: DestinationApi,
    T: Serialize,
{
    let data = serde_json::to_value(payload)
        .with_context(|| format!("failed to encode {} payload", collection.as_str()))?;
    destination.create(collection, &data)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{
        CategoryIdMap, migrate_categories, migrate_pages, migrate_posts, run_migration_with_api,
    };
    use crate::config::ResolvedSettings;
    use crate::destination::DestinationCollection;
    use crate::media::ImageMigrator;
    use crate::media::tests::{MockDestination, MockSource};
    use crate::source::SourceBatch;

    const LONG_EXCERPT: &str = "<p>Hello <b>world</b>, very long text exceeding eighty characters threshold repeated repeated repeated</p>";

    fn settings() -> ResolvedSettings {
        ResolvedSettings {
            source_api_url: "https://blog.example/wp-json/wp/v2".to_string(),
            destination_url: "http://localhost:1337".to_string(),
            destination_token: None,
            source_user_agent: "wp2strapi-test".to_string(),
            destination_user_agent: "wp2strapi-test".to_string(),
            timeout_ms: None,
            per_page: 100,
            strip_attribute_prefixes: vec!["data-elementor".to_string()],
            article_excerpt_chars: 80,
        }
    }

    fn single_page(source: &mut MockSource, resource: &'static str, items: Vec<Value>) {
        source.batches.insert(
            (resource, 1),
            SourceBatch {
                items,
                total_pages: Some(1),
            },
        );
    }

    fn category(id: u64, slug: &str) -> Value {
        json!({ "id": id, "name": format!("Name {slug}"), "slug": slug, "description": "About" })
    }

    fn entry(id: u64, slug: &str, content: &str, excerpt: &str, media: Option<&str>) -> Value {
        let mut value = json!({
            "id": id,
            "title": { "rendered": format!("Title {slug}") },
            "slug": slug,
            "content": { "rendered": content },
            "excerpt": { "rendered": excerpt },
        });
        if let Some(href) = media {
            value["_links"] = json!({ "wp:featuredmedia": [{ "href": href }] });
        }
        value
    }

    #[test]
    fn every_category_is_created_once_with_back_reference() {
        let mut source = MockSource::default();
        single_page(
            &mut source,
            "categories",
            vec![category(3, "travel"), category(5, "food")],
        );
        let mut destination = MockDestination::default();
        let mut map = CategoryIdMap::new();

        let report = migrate_categories(&settings(), &mut source, &mut destination, &mut map);

        assert_eq!(report.fetched, 2);
        assert_eq!(report.created, 2);
        let created = destination.created_in(DestinationCollection::Categories);
        assert_eq!(created.len(), 2);
        assert_eq!(created[0]["wp_id"], 3);
        assert_eq!(created[1]["wp_id"], 5);
        assert_eq!(created[0]["name"], "Name travel");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&3), Some(&101));
        assert_eq!(map.get(&5), Some(&102));
    }

    #[test]
    fn category_failure_is_logged_and_skipped() {
        let mut source = MockSource::default();
        single_page(
            &mut source,
            "categories",
            vec![category(3, "travel"), category(5, "food")],
        );
        let mut destination = MockDestination {
            reject_slugs: vec!["travel".to_string()],
            ..MockDestination::default()
        };
        let mut map = CategoryIdMap::new();

        let report = migrate_categories(&settings(), &mut source, &mut destination, &mut map);

        assert_eq!(report.created, 1);
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].contains("Name travel"));
        assert!(report.errors[0].contains("must be unique"));
        assert!(!map.contains_key(&3));
        assert!(map.contains_key(&5));
    }

    #[test]
    fn post_becomes_article_with_first_mapped_category() {
        let mut source = MockSource::default();
        let mut post = entry(
            7,
            "hello",
            r#"<!-- wp:image --><figure data-elementor-id="9"><img src="http://old/a.jpg"></figure>"#,
            LONG_EXCERPT,
            Some("https://blog.example/wp-json/wp/v2/media/12"),
        );
        post["categories"] = json!([99, 5, 3]);
        single_page(&mut source, "posts", vec![post]);
        source.media.insert(
            "https://blog.example/wp-json/wp/v2/media/12".to_string(),
            "http://old/cover.jpg".to_string(),
        );
        let mut destination = MockDestination::default();
        let mut images = ImageMigrator::new();
        let map = CategoryIdMap::from([(3, 201), (5, 205)]);

        let report = migrate_posts(&settings(), &mut source, &mut destination, &mut images, &map);

        assert_eq!(report.created, 1);
        let articles = destination.created_in(DestinationCollection::Articles);
        let article = articles[0];
        assert_eq!(article["wp_id"], 7);
        assert_eq!(article["category"], 205);
        assert_eq!(article["cover"], 1);
        assert_eq!(
            article["description"],
            "Hello world, very long text exceeding eighty characters threshold repeated repea"
        );
        let body = article["blocks"][0]["body"].as_str().expect("body");
        assert_eq!(article["blocks"][0]["__component"], "shared.rich-text");
        assert!(body.contains(r#"<img src="/uploads/a.jpg">"#));
        assert!(!body.contains("<!--"));
        assert!(!body.contains("data-elementor"));
    }

    #[test]
    fn post_with_broken_featured_media_is_created_without_cover() {
        let href = "https://blog.example/wp-json/wp/v2/media/404";
        let mut source = MockSource {
            broken_media: vec![href.to_string()],
            ..MockSource::default()
        };
        single_page(
            &mut source,
            "posts",
            vec![entry(8, "no-cover", "<p>Body</p>", "<p>Short</p>", Some(href))],
        );
        let mut destination = MockDestination::default();
        let mut images = ImageMigrator::new();

        let report = migrate_posts(
            &settings(),
            &mut source,
            &mut destination,
            &mut images,
            &CategoryIdMap::new(),
        );

        assert_eq!(report.created, 1);
        let article = destination.created_in(DestinationCollection::Articles)[0];
        assert!(article.get("cover").is_none());
        assert!(article.get("category").is_none());
        assert_eq!(article["description"], "Short");
    }

    #[test]
    fn pages_route_to_tours_or_pages() {
        let mut source = MockSource::default();
        single_page(
            &mut source,
            "pages",
            vec![
                entry(
                    20,
                    "coast-walk",
                    "<p>Tour Duration:<span>3 days<br>2 nights</span></p><p>Total Distance: 45 km</p>",
                    LONG_EXCERPT,
                    None,
                ),
                entry(21, "about", "<p>About us</p>", "<p>About us</p>", None),
            ],
        );
        let mut destination = MockDestination::default();
        let mut images = ImageMigrator::new();

        let report = migrate_pages(&settings(), &mut source, &mut destination, &mut images);

        assert_eq!(report.created, 2);
        assert_eq!(report.tours, 1);

        let tours = destination.created_in(DestinationCollection::Tours);
        assert_eq!(tours.len(), 1);
        assert_eq!(tours[0]["wp_id"], 20);
        assert_eq!(tours[0]["duration"], "3 days 2 nights");
        assert_eq!(tours[0]["distance"], "45 km");
        assert_eq!(
            tours[0]["excerpt"],
            "Hello world, very long text exceeding eighty characters threshold repeated repeated repeated"
        );
        assert!(tours[0]["content"].as_str().expect("content").contains("Total Distance: 45 km"));
        assert!(tours[0].get("blocks").is_none());

        let pages = destination.created_in(DestinationCollection::Pages);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0]["wp_id"], 21);
        assert!(pages[0].get("duration").is_none());
        assert!(pages[0].get("distance").is_none());
    }

    #[test]
    fn full_run_orders_phases_and_shares_image_cache() {
        let mut source = MockSource::default();
        single_page(&mut source, "categories", vec![category(3, "travel")]);
        let mut post = entry(
            7,
            "hello",
            r#"<img src="http://old/shared.jpg">"#,
            "<p>Hi</p>",
            None,
        );
        post["categories"] = json!([3]);
        single_page(&mut source, "posts", vec![post]);
        single_page(
            &mut source,
            "pages",
            vec![entry(
                21,
                "gallery",
                r#"<p><img src="http://old/shared.jpg"></p>"#,
                "",
                None,
            )],
        );
        let mut destination = MockDestination {
            reject_slugs: vec!["gallery".to_string()],
            ..MockDestination::default()
        };

        let report = run_migration_with_api(&settings(), &mut source, &mut destination);

        let order = destination
            .created
            .iter()
            .map(|(collection, _)| *collection)
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![DestinationCollection::Categories, DestinationCollection::Articles]
        );
        assert_eq!(destination.created[1].1["category"], 101);
        assert_eq!(destination.uploads, vec!["shared.jpg".to_string()]);
        assert_eq!(report.images.uploaded, 1);
        assert_eq!(report.images.cache_hits, 1);
        assert_eq!(report.pages.failed, 1);
        assert!(!report.success);
        assert_eq!(report.destination_requests, destination.request_count);
    }
}
