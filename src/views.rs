//! Public pages. Each view reads a slice of the content store and renders it
//! through a template; nothing here writes.

use chrono::Datelike;
use std::path::Path;

use crate::error::Result;
use crate::models::{
    AppointmentType, BOOK_CATEGORIES, BlogPost, Book, Choices, PAPER_CATEGORIES, Paper, Project,
    Skill, StudyChapter, StudyNote,
};
use crate::router::{AppState, Request, Response};
use crate::store::{self, Listing, SkillGroup};
use crate::template::{Context, TemplateValue, render_template};

const HOME_PROJECTS: u32 = 4;
const HOME_BOOKS: u32 = 3;
const HOME_PAPERS: u32 = 6;
const HOME_BLOG_POSTS: u32 = 3;

pub fn project_value(project: &Project) -> TemplateValue {
    TemplateValue::from_serialize(project).with("technologies_list", project.technologies_list())
}

pub fn book_value(book: &Book) -> TemplateValue {
    TemplateValue::from_serialize(book).with("category_display", book.category_display())
}

pub fn paper_value(paper: &Paper) -> TemplateValue {
    TemplateValue::from_serialize(paper).with("category_display", paper.category_display())
}

pub fn blog_post_value(post: &BlogPost) -> TemplateValue {
    TemplateValue::from_serialize(post).with("tags_list", post.tags_list())
}

pub fn skill_value(skill: &Skill) -> TemplateValue {
    TemplateValue::from_serialize(skill)
        .with("category_display", skill.category_display())
        .with("proficiency_display", skill.proficiency_display_text())
}

pub fn appointment_type_value(kind: &AppointmentType) -> TemplateValue {
    TemplateValue::from_serialize(kind).with("price_display", kind.price_display())
}

fn chapter_value(chapter: &StudyChapter) -> TemplateValue {
    TemplateValue::from_serialize(chapter).with("status_display", chapter.status_display())
}

fn skill_group_value(group: &SkillGroup) -> TemplateValue {
    TemplateValue::Object(Default::default())
        .with("category", group.category.clone())
        .with("label", group.label.clone())
        .with(
            "skills",
            TemplateValue::List(group.skills.iter().map(skill_value).collect()),
        )
}

fn list<T>(items: &[T], to_value: fn(&T) -> TemplateValue) -> TemplateValue {
    TemplateValue::List(items.iter().map(to_value).collect())
}

/// Category choices for a filter bar, marking the selected one.
pub fn category_choices(choices: Choices, selected: Option<&str>) -> TemplateValue {
    TemplateValue::List(
        choices
            .iter()
            .map(|(key, label)| {
                TemplateValue::Object(Default::default())
                    .with("key", *key)
                    .with("label", *label)
                    .with("selected", selected == Some(*key))
            })
            .collect(),
    )
}

/// Values every page shares: site settings, footer year, live reload.
async fn base_context(state: &AppState) -> Result<Context> {
    let mut context = Context::new();
    let site_settings = store::first_site_settings(&state.db).await?;
    context.insert(
        "site_settings".to_string(),
        site_settings
            .as_ref()
            .map(TemplateValue::from_serialize)
            .unwrap_or(TemplateValue::Null),
    );
    context.insert(
        "current_year".to_string(),
        TemplateValue::from(chrono::Local::now().year() as i64),
    );
    if let Some(url) = state.settings.livereload_url() {
        context.insert("livereload_url".to_string(), url.into());
    }
    Ok(context)
}

fn render(state: &AppState, template: &str, context: Result<Context>) -> Response {
    match context {
        Ok(context) => render_template(Path::new(&state.settings.template.dir), template, &context),
        Err(e) => {
            log::error!("Failed to load data for {}: {}", template, e);
            Response::server_error("An error occurred. Please try again.")
        }
    }
}

async fn study_notes_value(state: &AppState) -> Result<TemplateValue> {
    let notes: Vec<StudyNote> = store::featured_study_notes(&state.db).await?;
    let mut values = Vec::with_capacity(notes.len());
    for note in &notes {
        let chapters = store::chapters_for(&state.db, note.id).await?;
        values.push(
            TemplateValue::from_serialize(note)
                .with("progress", note.progress_percentage())
                .with("chapters", list(&chapters, chapter_value)),
        );
    }
    Ok(TemplateValue::List(values))
}

async fn home_context(state: &AppState) -> Result<Context> {
    let db = &state.db;
    let mut context = base_context(state).await?;
    let profile = store::first_profile(db).await?;
    let projects = store::projects(db, &Listing::featured(HOME_PROJECTS)).await?;
    let books = store::books(db, &Listing::featured(HOME_BOOKS)).await?;
    let papers = store::papers(db, &Listing::featured(HOME_PAPERS)).await?;
    let blog_posts = store::blog_posts(db, &Listing::featured(HOME_BLOG_POSTS)).await?;
    let skill_groups = store::group_skills_by_category(store::featured_skills(db).await?);

    context.insert(
        "profile".to_string(),
        profile
            .as_ref()
            .map(TemplateValue::from_serialize)
            .unwrap_or(TemplateValue::Null),
    );
    context.insert("projects".to_string(), list(&projects, project_value));
    context.insert("books".to_string(), list(&books, book_value));
    context.insert("papers".to_string(), list(&papers, paper_value));
    context.insert("blog_posts".to_string(), list(&blog_posts, blog_post_value));
    context.insert(
        "skills_by_category".to_string(),
        list(&skill_groups, skill_group_value),
    );
    context.insert("study_notes".to_string(), study_notes_value(state).await?);
    Ok(context)
}

pub async fn home(_request: Request, state: AppState) -> Response {
    let context = home_context(&state).await;
    render(&state, "portfolio/index.html", context)
}

async fn projects_context(state: &AppState) -> Result<Context> {
    let mut context = base_context(state).await?;
    let projects = store::projects(&state.db, &Listing::all()).await?;
    context.insert("projects".to_string(), list(&projects, project_value));
    context.insert("page_title".to_string(), "All Projects".into());
    Ok(context)
}

pub async fn projects_list(_request: Request, state: AppState) -> Response {
    let context = projects_context(&state).await;
    render(&state, "portfolio/projects.html", context)
}

async fn books_context(state: &AppState, category: Option<&str>) -> Result<Context> {
    let mut context = base_context(state).await?;
    let listing = Listing::in_category(category);
    let books = store::books(&state.db, &listing).await?;
    let selected = listing.category.as_deref();
    context.insert("books".to_string(), list(&books, book_value));
    context.insert(
        "categories".to_string(),
        category_choices(BOOK_CATEGORIES, selected),
    );
    context.insert("selected_category".to_string(), TemplateValue::from(selected));
    context.insert("page_title".to_string(), "My Bookshelf".into());
    Ok(context)
}

pub async fn books_list(request: Request, state: AppState) -> Response {
    let context = books_context(&state, request.query_param("category")).await;
    render(&state, "portfolio/books.html", context)
}

async fn papers_context(state: &AppState, category: Option<&str>) -> Result<Context> {
    let mut context = base_context(state).await?;
    let listing = Listing::in_category(category);
    let papers = store::papers(&state.db, &listing).await?;
    let selected = listing.category.as_deref();
    context.insert("papers".to_string(), list(&papers, paper_value));
    context.insert(
        "categories".to_string(),
        category_choices(PAPER_CATEGORIES, selected),
    );
    context.insert("selected_category".to_string(), TemplateValue::from(selected));
    context.insert("page_title".to_string(), "Research Papers".into());
    Ok(context)
}

pub async fn papers_list(request: Request, state: AppState) -> Response {
    let context = papers_context(&state, request.query_param("category")).await;
    render(&state, "portfolio/papers.html", context)
}

async fn blog_context(state: &AppState) -> Result<Context> {
    let mut context = base_context(state).await?;
    let posts = store::blog_posts(&state.db, &Listing::all()).await?;
    context.insert("blog_posts".to_string(), list(&posts, blog_post_value));
    context.insert("page_title".to_string(), "Blog Posts".into());
    Ok(context)
}

pub async fn blog_list(_request: Request, state: AppState) -> Response {
    let context = blog_context(&state).await;
    render(&state, "portfolio/blog.html", context)
}

async fn appointments_context(state: &AppState) -> Result<Context> {
    let mut context = base_context(state).await?;
    let profile = store::first_profile(&state.db).await?;
    let kinds = store::active_appointment_types(&state.db).await?;
    context.insert(
        "profile".to_string(),
        profile
            .as_ref()
            .map(TemplateValue::from_serialize)
            .unwrap_or(TemplateValue::Null),
    );
    context.insert(
        "appointment_types".to_string(),
        list(&kinds, appointment_type_value),
    );
    context.insert("page_title".to_string(), "Book an Appointment".into());
    Ok(context)
}

pub async fn appointments(_request: Request, state: AppState) -> Response {
    let context = appointments_context(&state).await;
    render(&state, "portfolio/appointments.html", context)
}

fn content_type(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "css" => Some("text/css; charset=utf-8"),
        "js" => Some("application/javascript; charset=utf-8"),
        "svg" => Some("image/svg+xml"),
        "txt" => Some("text/plain; charset=utf-8"),
        "html" => Some("text/html; charset=utf-8"),
        "json" => Some("application/json; charset=utf-8"),
        _ => None,
    }
}

/// Serve a text asset from the static directory.
pub async fn static_file(request: Request, state: AppState) -> Response {
    let (Some(dir), Some(file)) = (request.params.get("dir"), request.params.get("file")) else {
        return Response::not_found();
    };
    let unsafe_segment = |s: &str| s.is_empty() || s.starts_with('.') || s.contains(['/', '\\']);
    if unsafe_segment(dir) || unsafe_segment(file) {
        return Response::not_found();
    }
    let path = Path::new(&state.settings.static_dir).join(dir).join(file);
    let Some(mime) = content_type(&path) else {
        return Response::not_found();
    };
    match tokio::fs::read_to_string(&path).await {
        Ok(body) => Response::ok(body).with_header("Content-Type", mime),
        Err(_) => Response::not_found(),
    }
}
