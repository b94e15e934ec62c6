//! In-memory catalog: categories, genres, titles, reviews and comments.
//!
//! The catalog only carries what the HTTP surface needs: single-record CRUD and
//! the author of every review/comment for ownership checks.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use critica_core::AccountId;

pub const SLUG_MAX_LEN: usize = 50;
pub const TAXON_NAME_MAX_LEN: usize = 256;
pub const TITLE_NAME_MAX_LEN: usize = 256;
pub const SCORE_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("catalog storage error: {0}")]
    Backend(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

macro_rules! record_id {
    ($name:ident) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(TitleId);
record_id!(ReviewId);
record_id!(CommentId);

// ─────────────────────────────────────────────────────────────────────────────
// Categories & genres
// ─────────────────────────────────────────────────────────────────────────────

/// Which taxonomy a [`Taxon`] belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TaxonKind {
    Category,
    Genre,
}

impl TaxonKind {
    fn label(self) -> &'static str {
        match self {
            TaxonKind::Category => "category",
            TaxonKind::Genre => "genre",
        }
    }
}

/// A category or genre: a named, slug-addressed label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
    pub name: String,
    pub slug: String,
}

impl Taxon {
    pub fn new(name: &str, slug: &str) -> CatalogResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::Validation("name is required".into()));
        }
        if name.chars().count() > TAXON_NAME_MAX_LEN {
            return Err(CatalogError::Validation(format!(
                "name must be at most {TAXON_NAME_MAX_LEN} characters"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            slug: parse_slug(slug)?,
        })
    }
}

fn parse_slug(raw: &str) -> CatalogResult<String> {
    let slug = raw.trim();
    if slug.is_empty() || slug.len() > SLUG_MAX_LEN {
        return Err(CatalogError::Validation(format!(
            "slug must be 1 to {SLUG_MAX_LEN} characters"
        )));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CatalogError::Validation(
            "slug may only contain letters, digits, '-' and '_'".into(),
        ));
    }
    Ok(slug.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Titles
// ─────────────────────────────────────────────────────────────────────────────

/// Stored title; category and genres are held by slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub id: TitleId,
    pub name: String,
    pub year: i32,
    pub description: String,
    pub category: Option<String>,
    pub genres: Vec<String>,
}

/// Title create payload; category and genres are referenced by slug and both
/// must be present (the genre list may be empty).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TitleDraft {
    pub name: String,
    pub year: i32,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(rename = "genre")]
    pub genres: Vec<String>,
}

/// Partial title update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TitlePatch {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "genre")]
    pub genres: Option<Vec<String>>,
}

/// Read-side title with category/genre expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleView {
    pub id: TitleId,
    pub name: String,
    pub year: i32,
    pub description: String,
    pub category: Option<Taxon>,
    pub genre: Vec<Taxon>,
}

fn check_title_name(name: &str) -> CatalogResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::Validation("name is required".into()));
    }
    if name.chars().count() > TITLE_NAME_MAX_LEN {
        return Err(CatalogError::Validation(format!(
            "name must be at most {TITLE_NAME_MAX_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn check_year(year: i32, current_year: i32) -> CatalogResult<i32> {
    if year > current_year {
        return Err(CatalogError::Validation(format!(
            "year {year} is in the future"
        )));
    }
    Ok(year)
}

// ─────────────────────────────────────────────────────────────────────────────
// Reviews & comments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub id: ReviewId,
    pub title_id: TitleId,
    pub author: AccountId,
    pub text: String,
    pub score: u8,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviewDraft {
    pub text: String,
    pub score: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReviewPatch {
    pub text: Option<String>,
    pub score: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub review_id: ReviewId,
    pub author: AccountId,
    pub text: String,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommentDraft {
    pub text: String,
}

fn check_text(text: &str) -> CatalogResult<String> {
    if text.trim().is_empty() {
        return Err(CatalogError::Validation("text is required".into()));
    }
    Ok(text.to_string())
}

fn check_score(score: u8) -> CatalogResult<u8> {
    if !SCORE_RANGE.contains(&score) {
        return Err(CatalogError::Validation(format!(
            "score must be between {} and {}",
            SCORE_RANGE.start(),
            SCORE_RANGE.end()
        )));
    }
    Ok(score)
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct State {
    categories: BTreeMap<String, Taxon>,
    genres: BTreeMap<String, Taxon>,
    titles: BTreeMap<TitleId, Title>,
    reviews: BTreeMap<ReviewId, Review>,
    comments: BTreeMap<CommentId, Comment>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn taxa(&self, kind: TaxonKind) -> &BTreeMap<String, Taxon> {
        match kind {
            TaxonKind::Category => &self.categories,
            TaxonKind::Genre => &self.genres,
        }
    }

    fn taxa_mut(&mut self, kind: TaxonKind) -> &mut BTreeMap<String, Taxon> {
        match kind {
            TaxonKind::Category => &mut self.categories,
            TaxonKind::Genre => &mut self.genres,
        }
    }

    fn require_taxon(&self, kind: TaxonKind, slug: &str) -> CatalogResult<String> {
        if self.taxa(kind).contains_key(slug) {
            Ok(slug.to_string())
        } else {
            Err(CatalogError::Validation(format!(
                "unknown {} '{slug}'",
                kind.label()
            )))
        }
    }

    fn require_genres(&self, slugs: &[String]) -> CatalogResult<Vec<String>> {
        let mut out = Vec::with_capacity(slugs.len());
        for slug in slugs {
            let slug = self.require_taxon(TaxonKind::Genre, slug)?;
            if !out.contains(&slug) {
                out.push(slug);
            }
        }
        Ok(out)
    }

    fn view(&self, title: &Title) -> TitleView {
        TitleView {
            id: title.id,
            name: title.name.clone(),
            year: title.year,
            description: title.description.clone(),
            category: title
                .category
                .as_ref()
                .and_then(|slug| self.categories.get(slug).cloned()),
            genre: title
                .genres
                .iter()
                .filter_map(|slug| self.genres.get(slug).cloned())
                .collect(),
        }
    }

    fn review_in(&self, title_id: TitleId, review_id: ReviewId) -> CatalogResult<&Review> {
        if !self.titles.contains_key(&title_id) {
            return Err(CatalogError::NotFound("title"));
        }
        self.reviews
            .get(&review_id)
            .filter(|r| r.title_id == title_id)
            .ok_or(CatalogError::NotFound("review"))
    }

    fn comment_in(
        &self,
        title_id: TitleId,
        review_id: ReviewId,
        comment_id: CommentId,
    ) -> CatalogResult<&Comment> {
        self.review_in(title_id, review_id)?;
        self.comments
            .get(&comment_id)
            .filter(|c| c.review_id == review_id)
            .ok_or(CatalogError::NotFound("comment"))
    }

    fn drop_review(&mut self, review_id: ReviewId) {
        self.reviews.remove(&review_id);
        self.comments.retain(|_, c| c.review_id != review_id);
    }
}

/// Thread-safe in-memory catalog.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<State>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CatalogResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| CatalogError::Backend("catalog lock poisoned".into()))
    }

    fn write(&self) -> CatalogResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| CatalogError::Backend("catalog lock poisoned".into()))
    }

    // ── categories / genres ────────────────────────────────────────────────

    pub fn list_taxa(&self, kind: TaxonKind) -> CatalogResult<Vec<Taxon>> {
        Ok(self.read()?.taxa(kind).values().cloned().collect())
    }

    pub fn create_taxon(&self, kind: TaxonKind, taxon: Taxon) -> CatalogResult<Taxon> {
        let mut state = self.write()?;
        let taxa = state.taxa_mut(kind);
        if taxa.contains_key(&taxon.slug) {
            return Err(CatalogError::Conflict(format!(
                "{} with slug '{}' already exists",
                kind.label(),
                taxon.slug
            )));
        }
        taxa.insert(taxon.slug.clone(), taxon.clone());
        Ok(taxon)
    }

    /// Delete a category/genre; titles keep existing without it.
    pub fn delete_taxon(&self, kind: TaxonKind, slug: &str) -> CatalogResult<()> {
        let mut state = self.write()?;
        if state.taxa_mut(kind).remove(slug).is_none() {
            return Err(CatalogError::NotFound(kind.label()));
        }
        for title in state.titles.values_mut() {
            match kind {
                TaxonKind::Category => {
                    if title.category.as_deref() == Some(slug) {
                        title.category = None;
                    }
                }
                TaxonKind::Genre => title.genres.retain(|g| g != slug),
            }
        }
        Ok(())
    }

    // ── titles ─────────────────────────────────────────────────────────────

    pub fn list_titles(&self) -> CatalogResult<Vec<TitleView>> {
        let state = self.read()?;
        Ok(state.titles.values().map(|t| state.view(t)).collect())
    }

    pub fn title(&self, id: TitleId) -> CatalogResult<TitleView> {
        let state = self.read()?;
        let title = state.titles.get(&id).ok_or(CatalogError::NotFound("title"))?;
        Ok(state.view(title))
    }

    pub fn create_title(&self, draft: TitleDraft, current_year: i32) -> CatalogResult<Title> {
        let mut state = self.write()?;
        let name = check_title_name(&draft.name)?;
        let year = check_year(draft.year, current_year)?;
        let category = Some(state.require_taxon(TaxonKind::Category, &draft.category)?);
        let genres = state.require_genres(&draft.genres)?;

        let id = TitleId(state.next_id());
        let title = Title {
            id,
            name,
            year,
            description: draft.description,
            category,
            genres,
        };
        state.titles.insert(id, title.clone());
        Ok(title)
    }

    pub fn update_title(&self, id: TitleId, patch: TitlePatch, current_year: i32) -> CatalogResult<Title> {
        let mut state = self.write()?;
        let mut title = state
            .titles
            .get(&id)
            .cloned()
            .ok_or(CatalogError::NotFound("title"))?;

        if let Some(name) = &patch.name {
            title.name = check_title_name(name)?;
        }
        if let Some(year) = patch.year {
            title.year = check_year(year, current_year)?;
        }
        if let Some(description) = patch.description {
            title.description = description;
        }
        if let Some(slug) = &patch.category {
            title.category = Some(state.require_taxon(TaxonKind::Category, slug)?);
        }
        if let Some(genres) = &patch.genres {
            title.genres = state.require_genres(genres)?;
        }

        state.titles.insert(id, title.clone());
        Ok(title)
    }

    /// Delete a title together with its reviews and their comments.
    pub fn delete_title(&self, id: TitleId) -> CatalogResult<()> {
        let mut state = self.write()?;
        if state.titles.remove(&id).is_none() {
            return Err(CatalogError::NotFound("title"));
        }
        let reviews: Vec<ReviewId> = state
            .reviews
            .values()
            .filter(|r| r.title_id == id)
            .map(|r| r.id)
            .collect();
        for review_id in reviews {
            state.drop_review(review_id);
        }
        Ok(())
    }

    // ── reviews ────────────────────────────────────────────────────────────

    pub fn list_reviews(&self, title_id: TitleId) -> CatalogResult<Vec<Review>> {
        let state = self.read()?;
        if !state.titles.contains_key(&title_id) {
            return Err(CatalogError::NotFound("title"));
        }
        Ok(state
            .reviews
            .values()
            .filter(|r| r.title_id == title_id)
            .cloned()
            .collect())
    }

    pub fn review(&self, title_id: TitleId, review_id: ReviewId) -> CatalogResult<Review> {
        self.read()?.review_in(title_id, review_id).cloned()
    }

    /// At most one review per (author, title).
    pub fn create_review(
        &self,
        title_id: TitleId,
        author: AccountId,
        draft: ReviewDraft,
        now: DateTime<Utc>,
    ) -> CatalogResult<Review> {
        let mut state = self.write()?;
        if !state.titles.contains_key(&title_id) {
            return Err(CatalogError::NotFound("title"));
        }
        let text = check_text(&draft.text)?;
        let score = check_score(draft.score)?;
        if state
            .reviews
            .values()
            .any(|r| r.title_id == title_id && r.author == author)
        {
            return Err(CatalogError::Validation(
                "you have already reviewed this title".into(),
            ));
        }

        let review = Review {
            id: ReviewId(state.next_id()),
            title_id,
            author,
            text,
            score,
            pub_date: now,
        };
        state.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    pub fn update_review(
        &self,
        title_id: TitleId,
        review_id: ReviewId,
        patch: ReviewPatch,
    ) -> CatalogResult<Review> {
        let mut state = self.write()?;
        let mut review = state.review_in(title_id, review_id)?.clone();
        if let Some(text) = &patch.text {
            review.text = check_text(text)?;
        }
        if let Some(score) = patch.score {
            review.score = check_score(score)?;
        }
        state.reviews.insert(review_id, review.clone());
        Ok(review)
    }

    pub fn delete_review(&self, title_id: TitleId, review_id: ReviewId) -> CatalogResult<()> {
        let mut state = self.write()?;
        state.review_in(title_id, review_id)?;
        state.drop_review(review_id);
        Ok(())
    }

    // ── comments ───────────────────────────────────────────────────────────

    pub fn list_comments(&self, title_id: TitleId, review_id: ReviewId) -> CatalogResult<Vec<Comment>> {
        let state = self.read()?;
        state.review_in(title_id, review_id)?;
        Ok(state
            .comments
            .values()
            .filter(|c| c.review_id == review_id)
            .cloned()
            .collect())
    }

    pub fn comment(&self, title_id: TitleId, review_id: ReviewId, comment_id: CommentId) -> CatalogResult<Comment> {
        self.read()?.comment_in(title_id, review_id, comment_id).cloned()
    }

    pub fn create_comment(
        &self,
        title_id: TitleId,
        review_id: ReviewId,
        author: AccountId,
        draft: CommentDraft,
        now: DateTime<Utc>,
    ) -> CatalogResult<Comment> {
        let mut state = self.write()?;
        state.review_in(title_id, review_id)?;
        let comment = Comment {
            id: CommentId(state.next_id()),
            review_id,
            author,
            text: check_text(&draft.text)?,
            pub_date: now,
        };
        state.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    pub fn update_comment(
        &self,
        title_id: TitleId,
        review_id: ReviewId,
        comment_id: CommentId,
        draft: CommentDraft,
    ) -> CatalogResult<Comment> {
        let mut state = self.write()?;
        let mut comment = state.comment_in(title_id, review_id, comment_id)?.clone();
        comment.text = check_text(&draft.text)?;
        state.comments.insert(comment_id, comment.clone());
        Ok(comment)
    }

    pub fn delete_comment(&self, title_id: TitleId, review_id: ReviewId, comment_id: CommentId) -> CatalogResult<()> {
        let mut state = self.write()?;
        state.comment_in(title_id, review_id, comment_id)?;
        state.comments.remove(&comment_id);
        Ok(())
    }

    // ── authors ────────────────────────────────────────────────────────────

    /// Drop everything `author` wrote: their reviews (with the comments under
    /// them) and their comments elsewhere. Returns how many records went.
    pub fn purge_author(&self, author: AccountId) -> CatalogResult<usize> {
        let mut state = self.write()?;
        let reviews: Vec<ReviewId> = state
            .reviews
            .values()
            .filter(|r| r.author == author)
            .map(|r| r.id)
            .collect();
        let before = state.reviews.len() + state.comments.len();
        for review_id in reviews {
            state.drop_review(review_id);
        }
        state.comments.retain(|_, c| c.author != author);
        Ok(before - state.reviews.len() - state.comments.len())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const YEAR: i32 = 2026;

    fn seeded() -> (InMemoryCatalog, TitleId) {
        let catalog = InMemoryCatalog::new();
        catalog
            .create_taxon(TaxonKind::Category, Taxon::new("Books", "books").unwrap())
            .unwrap();
        catalog
            .create_taxon(TaxonKind::Genre, Taxon::new("Drama", "drama").unwrap())
            .unwrap();
        let title = catalog
            .create_title(
                TitleDraft {
                    name: "War and Peace".into(),
                    year: 1869,
                    description: String::new(),
                    category: "books".into(),
                    genres: vec!["drama".into(), "drama".into()],
                },
                YEAR,
            )
            .unwrap();
        (catalog, title.id)
    }

    fn draft(score: u8) -> ReviewDraft {
        ReviewDraft {
            text: "worth it".into(),
            score,
        }
    }

    #[test]
    fn title_view_expands_slugs() {
        let (catalog, id) = seeded();
        let view = catalog.title(id).unwrap();
        assert_eq!(view.category.unwrap().name, "Books");
        assert_eq!(view.genre.len(), 1);
    }

    #[test]
    fn unknown_slugs_and_future_years_are_rejected() {
        let (catalog, id) = seeded();
        let bad_genre = TitlePatch {
            genres: Some(vec!["horror".into()]),
            ..Default::default()
        };
        assert!(matches!(
            catalog.update_title(id, bad_genre, YEAR),
            Err(CatalogError::Validation(_))
        ));
        let future = TitlePatch {
            year: Some(YEAR + 1),
            ..Default::default()
        };
        assert!(matches!(
            catalog.update_title(id, future, YEAR),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_slug_is_a_conflict() {
        let (catalog, _) = seeded();
        let err = catalog
            .create_taxon(TaxonKind::Genre, Taxon::new("Drama again", "drama").unwrap())
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
        assert!(Taxon::new("Bad", "has space").is_err());
    }

    #[test]
    fn review_score_and_uniqueness() {
        let (catalog, id) = seeded();
        let author = AccountId::new();
        let now = Utc::now();

        for score in [0, 11] {
            assert!(matches!(
                catalog.create_review(id, author, draft(score), now),
                Err(CatalogError::Validation(_))
            ));
        }
        catalog.create_review(id, author, draft(10), now).unwrap();
        assert!(matches!(
            catalog.create_review(id, author, draft(5), now),
            Err(CatalogError::Validation(_))
        ));
        catalog.create_review(id, AccountId::new(), draft(1), now).unwrap();
        assert_eq!(catalog.list_reviews(id).unwrap().len(), 2);
    }

    #[test]
    fn records_are_scoped_to_their_parent() {
        let (catalog, id) = seeded();
        let now = Utc::now();
        let review = catalog.create_review(id, AccountId::new(), draft(7), now).unwrap();

        assert_eq!(
            catalog.review(TitleId(9999), review.id),
            Err(CatalogError::NotFound("title"))
        );
        assert_eq!(
            catalog.comment(id, review.id, CommentId(9999)),
            Err(CatalogError::NotFound("comment"))
        );
    }

    #[test]
    fn deleting_a_title_cascades() {
        let (catalog, id) = seeded();
        let now = Utc::now();
        let review = catalog.create_review(id, AccountId::new(), draft(7), now).unwrap();
        let comment = catalog
            .create_comment(id, review.id, AccountId::new(), CommentDraft { text: "agreed".into() }, now)
            .unwrap();

        catalog.delete_title(id).unwrap();
        assert!(catalog.read().unwrap().reviews.is_empty());
        assert!(!catalog.read().unwrap().comments.contains_key(&comment.id));
    }

    #[test]
    fn deleting_a_category_detaches_titles() {
        let (catalog, id) = seeded();
        catalog.delete_taxon(TaxonKind::Category, "books").unwrap();
        assert_eq!(catalog.title(id).unwrap().category, None);
        assert_eq!(
            catalog.delete_taxon(TaxonKind::Category, "books"),
            Err(CatalogError::NotFound("category"))
        );
    }

    #[test]
    fn purging_an_author_removes_their_reviews_and_comments() {
        let (catalog, id) = seeded();
        let now = Utc::now();
        let gone = AccountId::new();
        let other = AccountId::new();

        let theirs = catalog.create_review(id, gone, draft(4), now).unwrap();
        let kept = catalog.create_review(id, other, draft(8), now).unwrap();
        // A comment by someone else under the purged review goes with it.
        catalog
            .create_comment(id, theirs.id, other, CommentDraft { text: "hm".into() }, now)
            .unwrap();
        catalog
            .create_comment(id, kept.id, gone, CommentDraft { text: "nope".into() }, now)
            .unwrap();
        let survivor = catalog
            .create_comment(id, kept.id, other, CommentDraft { text: "yes".into() }, now)
            .unwrap();

        assert_eq!(catalog.purge_author(gone).unwrap(), 3);

        let reviews = catalog.list_reviews(id).unwrap();
        assert_eq!(reviews.iter().map(|r| r.id).collect::<Vec<_>>(), vec![kept.id]);
        let comments = catalog.list_comments(id, kept.id).unwrap();
        assert_eq!(comments.iter().map(|c| c.id).collect::<Vec<_>>(), vec![survivor.id]);

        assert_eq!(catalog.purge_author(gone).unwrap(), 0);
    }
}
