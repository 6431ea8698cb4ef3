//! Static seed corpus loaded once at startup iff the `guides` table is
//! empty (§4.5.4). Kept as a Rust const array rather than an external
//! file — the core reads no configuration files (§6).

use sa_domain::models::GuideEntry;

pub struct SeedGuide {
    pub slug: &'static str,
    pub title: &'static str,
    pub category: &'static str,
    pub difficulty: &'static str,
    pub excerpt: &'static str,
    pub body: &'static str,
    pub tags: &'static [&'static str],
}

pub const SEED_GUIDES: &[SeedGuide] = &[
    SeedGuide {
        slug: "tool-discovery",
        title: "Finding the right tool",
        category: "onboarding",
        difficulty: "beginner",
        excerpt: "How list_tools ranks the catalog down to what's relevant.",
        body: "Pass a free-text `query` hint to list_tools and the gateway will \
               rank the live catalog with BM25, boost by past usage, and return \
               the essential set plus the top matches. Omit the hint to see \
               everything registered.",
        tags: &["tools", "search", "bm25"],
    },
    SeedGuide {
        slug: "using-memory",
        title: "Saving and recalling memory",
        category: "memory",
        difficulty: "beginner",
        excerpt: "memory_save, memory_recall, memory_list, memory_forget.",
        body: "Memory entries are free-form key/value pairs with optional \
               category and tags. `memory_recall` ranks entries by relevance \
               to a query; an empty query always returns nothing.",
        tags: &["memory", "recall"],
    },
    SeedGuide {
        slug: "task-planning",
        title: "Planning a task tree",
        category: "planning",
        difficulty: "intermediate",
        excerpt: "planning_create, planning_update, planning_tree, planning_delete.",
        body: "Tasks form a forest keyed by parent id. Reassigning a parent \
               that would create a cycle is rejected. Deleting a task deletes \
               its whole subtree.",
        tags: &["planning", "tasks"],
    },
    SeedGuide {
        slug: "tdd-workflow",
        title: "Driving TDD with tdd_red/green/refactor",
        category: "tdd",
        difficulty: "intermediate",
        excerpt: "Recording red/green/refactor phases against a task.",
        body: "Each of tdd_red, tdd_green, tdd_refactor invokes the configured \
               test runner against a test path and records the outcome on the \
               task. tdd_verify reports the last outcome and warns if the last \
               recorded phase wasn't green.",
        tags: &["tdd", "testing"],
    },
    SeedGuide {
        slug: "writing-guides",
        title: "Authoring a new guide",
        category: "meta",
        difficulty: "advanced",
        excerpt: "Guides are searchable markdown with a stepper for tutorials.",
        body: "A guide has a title, excerpt, markdown body, and tags, indexed \
               for guide_search. guide_tutorial drives per-session learning \
               progress through start/next/previous/check/hint/complete/reset.",
        tags: &["guides", "authoring"],
    },
];

pub fn as_entries() -> Vec<GuideEntry> {
    SEED_GUIDES
        .iter()
        .map(|g| GuideEntry {
            id: uuid::Uuid::new_v4().to_string(),
            slug: g.slug.to_string(),
            title: g.title.to_string(),
            category: Some(g.category.to_string()),
            difficulty: Some(g.difficulty.to_string()),
            body: g.body.to_string(),
            excerpt: g.excerpt.to_string(),
            tags: g.tags.iter().map(|s| s.to_string()).collect(),
        })
        .collect()
}
