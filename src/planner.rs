//! Expands a translation request into an ordered plan.
//!
//! The planner is synchronous and works on a `StoreSnapshot` loaded once per
//! run. Each (post, target language) pair in scope yields exactly one plan
//! entry: either a `WorkItem` to dispatch or an outcome settled up front
//! (skipped by the classifier, or failed for lack of source content).
//! Posts come out ascending by id and languages ascending by code.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::error::{PlanningError, StoreError};
use crate::fingerprint::fingerprint;
use crate::models::{ItemKey, ItemResult, Language, Post, Translation, WorkItem};
use crate::staleness::should_translate;
use crate::store::ContentStore;

pub const REASON_NO_SOURCE: &str = "no source content";
pub const REASON_ALREADY_TRANSLATED: &str = "already translated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationRequest {
    /// One post, every active target language
    SinglePost { post_id: i64, force: bool },
    /// Every post, every active target language
    AllPosts { force: bool },
    /// Every post, but only languages with no translation at all
    MissingOnly,
    /// Exactly the given languages, for the given posts or all of them; forced
    ExplicitLanguages {
        language_codes: Vec<String>,
        post_ids: Option<Vec<i64>>,
    },
}

impl TranslationRequest {
    fn force(&self) -> bool {
        match self {
            TranslationRequest::SinglePost { force, .. } => *force,
            TranslationRequest::AllPosts { force } => *force,
            TranslationRequest::MissingOnly => false,
            TranslationRequest::ExplicitLanguages { .. } => true,
        }
    }

    /// Requests that name their posts report missing source per post
    /// instead of refusing to plan.
    fn is_targeted(&self) -> bool {
        matches!(
            self,
            TranslationRequest::SinglePost { .. }
                | TranslationRequest::ExplicitLanguages {
                    post_ids: Some(_),
                    ..
                }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            TranslationRequest::SinglePost { .. } => "single_post",
            TranslationRequest::AllPosts { .. } => "all_posts",
            TranslationRequest::MissingOnly => "missing_only",
            TranslationRequest::ExplicitLanguages { .. } => "explicit_languages",
        }
    }
}

/// Content read from the store for one run.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Active languages
    pub languages: Vec<Language>,
    /// Posts in scope of the request
    pub posts: Vec<Post>,
    /// Translations of the posts in scope, by post id then language code
    pub translations: HashMap<i64, BTreeMap<String, Translation>>,
}

impl StoreSnapshot {
    /// Load what `request` needs. Requested posts that do not exist are
    /// simply absent; the planner reports them.
    pub async fn load(
        store: &dyn ContentStore,
        request: &TranslationRequest,
    ) -> Result<Self, StoreError> {
        let languages = store.list_languages(true).await?;

        let posts = match request {
            TranslationRequest::SinglePost { post_id, .. } => {
                store.get_post(*post_id).await?.into_iter().collect()
            }
            TranslationRequest::ExplicitLanguages {
                post_ids: Some(ids),
                ..
            } => {
                let mut posts = Vec::new();
                for id in ids.iter().collect::<BTreeSet<_>>() {
                    if let Some(post) = store.get_post(*id).await? {
                        posts.push(post);
                    }
                }
                posts
            }
            _ => store.list_posts().await?,
        };

        let mut translations = HashMap::new();
        for post in &posts {
            let rows = store.list_translations(post.id).await?;
            translations.insert(
                post.id,
                rows.into_iter()
                    .map(|t| (t.language_code.clone(), t))
                    .collect(),
            );
        }

        Ok(Self {
            languages,
            posts,
            translations,
        })
    }

    pub fn translation(&self, post_id: i64, language_code: &str) -> Option<&Translation> {
        self.translations
            .get(&post_id)
            .and_then(|rows| rows.get(language_code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanEntry {
    Dispatch(WorkItem),
    Settled(ItemResult),
}

impl PlanEntry {
    pub fn key(&self) -> ItemKey {
        match self {
            PlanEntry::Dispatch(item) => item.key(),
            PlanEntry::Settled(result) => result.key(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<ItemKey> {
        self.entries.iter().map(PlanEntry::key).collect()
    }

    pub fn work_items(&self) -> impl Iterator<Item = &WorkItem> {
        self.entries.iter().filter_map(|e| match e {
            PlanEntry::Dispatch(item) => Some(item),
            PlanEntry::Settled(_) => None,
        })
    }

    /// Split into the items to dispatch and the outcomes already known.
    pub fn into_parts(self) -> (Vec<WorkItem>, Vec<ItemResult>) {
        let mut items = Vec::new();
        let mut settled = Vec::new();
        for entry in self.entries {
            match entry {
                PlanEntry::Dispatch(item) => items.push(item),
                PlanEntry::Settled(result) => settled.push(result),
            }
        }
        (items, settled)
    }
}

fn resolve_default(languages: &[Language]) -> Result<&Language, PlanningError> {
    if languages.is_empty() {
        return Err(PlanningError::NoActiveLanguages);
    }
    let defaults: Vec<&Language> = languages.iter().filter(|l| l.is_default).collect();
    match defaults.as_slice() {
        [] => Err(PlanningError::NoDefaultLanguage),
        [only] => Ok(*only),
        many => Err(PlanningError::MultipleDefaultLanguages(
            many.iter()
                .map(|l| l.code.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )),
    }
}

fn target_languages<'a>(
    request: &TranslationRequest,
    languages: &'a [Language],
    default: &Language,
) -> Result<Vec<&'a Language>, PlanningError> {
    let mut targets: Vec<&Language> = match request {
        TranslationRequest::ExplicitLanguages { language_codes, .. } => {
            let codes: BTreeSet<&str> = language_codes
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .collect();
            if codes.is_empty() {
                return Err(PlanningError::EmptyLanguageSelection);
            }
            codes
                .into_iter()
                .map(|code| {
                    if code == default.code {
                        return Err(PlanningError::DefaultLanguageTarget(code.to_string()));
                    }
                    languages
                        .iter()
                        .find(|l| l.code == code)
                        .ok_or_else(|| PlanningError::UnknownLanguage(code.to_string()))
                })
                .collect::<Result<_, _>>()?
        }
        _ => languages.iter().filter(|l| !l.is_default).collect(),
    };

    if targets.is_empty() {
        return Err(PlanningError::NoTargetLanguages);
    }
    targets.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(targets)
}

fn posts_in_scope<'a>(
    request: &TranslationRequest,
    snapshot: &'a StoreSnapshot,
) -> Result<Vec<&'a Post>, PlanningError> {
    let find = |id: i64| {
        snapshot
            .posts
            .iter()
            .find(|p| p.id == id)
            .ok_or(PlanningError::PostNotFound(id))
    };

    let mut posts: Vec<&Post> = match request {
        TranslationRequest::SinglePost { post_id, .. } => vec![find(*post_id)?],
        TranslationRequest::ExplicitLanguages {
            post_ids: Some(ids),
            ..
        } => ids
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|id| find(*id))
            .collect::<Result<_, _>>()?,
        _ => snapshot.posts.iter().collect(),
    };

    posts.sort_by_key(|p| p.id);
    posts.dedup_by_key(|p| p.id);
    Ok(posts)
}

/// Build the plan for `request` over `snapshot`.
pub fn plan(request: &TranslationRequest, snapshot: &StoreSnapshot) -> Result<Plan, PlanningError> {
    let default = resolve_default(&snapshot.languages)?;
    let targets = target_languages(request, &snapshot.languages, default)?;
    let posts = posts_in_scope(request, snapshot)?;
    let force = request.force();
    let missing_only = matches!(request, TranslationRequest::MissingOnly);

    let mut entries = Vec::with_capacity(posts.len() * targets.len());
    let mut posts_with_source = 0usize;

    for post in &posts {
        let source = snapshot
            .translation(post.id, &default.code)
            .filter(|t| t.fields.has_content());

        let Some(source) = source else {
            debug!(post_id = post.id, "Post has no default-language content");
            for target in &targets {
                let key = ItemKey::new(post.id, &target.code);
                entries.push(PlanEntry::Settled(ItemResult::failed(&key, REASON_NO_SOURCE)));
            }
            continue;
        };

        posts_with_source += 1;
        let source_fingerprint = fingerprint(&source.fields);

        for target in &targets {
            let key = ItemKey::new(post.id, &target.code);
            let existing = snapshot.translation(post.id, &target.code);

            if missing_only && existing.is_some() {
                entries.push(PlanEntry::Settled(ItemResult::skipped(
                    &key,
                    REASON_ALREADY_TRANSLATED,
                )));
                continue;
            }

            let decision = should_translate(&source_fingerprint, existing, force);
            if decision.proceed {
                entries.push(PlanEntry::Dispatch(WorkItem {
                    post_id: post.id,
                    source_language: default.code.clone(),
                    target_language: target.code.clone(),
                    source: source.fields.clone(),
                    source_fingerprint: source_fingerprint.clone(),
                    force,
                    reason: decision.reason.to_string(),
                }));
            } else {
                entries.push(PlanEntry::Settled(ItemResult::skipped(
                    &key,
                    decision.reason.as_str(),
                )));
            }
        }
    }

    if !request.is_targeted() && !posts.is_empty() && posts_with_source == 0 {
        return Err(PlanningError::NoSourceContent);
    }

    Ok(Plan { entries })
}
