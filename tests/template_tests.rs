use portfolio::template;
use portfolio::template::*;
use std::collections::HashMap;
use std::fs;

#[test]
fn test_tokenize_basic() {
    let input = "Hello, {{ username }}! {% if user.is_admin %}Admin!{% endif %}";
    let tokens = tokenize_template(input);

    assert_eq!(tokens.len(), 6);
    match &tokens[1] {
        Token::Variable(var) => assert_eq!(var, "username"),
        _ => panic!("Expected variable token"),
    }
    match &tokens[2] {
        Token::Text(text) => assert_eq!(text, "! "),
        _ => panic!("Expected text token"),
    }
}

#[test]
fn test_parse_simple_nodes() {
    let nodes = parse_tokens(&tokenize_template("Welcome, {{user.name}}"));
    assert_eq!(nodes.len(), 2);
    match &nodes[1] {
        Node::Variable(var) => assert_eq!(var, "user.name"),
        _ => panic!("Expected variable node"),
    }
}

#[test]
fn test_render_nodes_text_and_variable() {
    let nodes = vec![
        Node::Text("Hello, ".to_string()),
        Node::Variable("username".to_string()),
        Node::Text("!".to_string()),
    ];
    let mut context = HashMap::new();
    context.insert("username".to_string(), TemplateValue::from("Ada"));
    assert_eq!(template::render_nodes(&nodes, &context), "Hello, Ada!");
}

fn render_str(source: &str, context: &Context) -> String {
    render_nodes(&parse_tokens(&tokenize_template(source)), context)
}

#[test]
fn test_if_else_and_not() {
    let source = "{% if is_admin %}admin{% else %}user{% endif %}|{% if not items %}none{% endif %}";
    let mut context = HashMap::new();
    context.insert("is_admin".to_string(), TemplateValue::Bool(true));
    context.insert("items".to_string(), TemplateValue::List(vec![]));
    assert_eq!(render_str(source, &context), "admin|none");

    context.insert("is_admin".to_string(), TemplateValue::Bool(false));
    context.insert("items".to_string(), vec!["x"].into());
    assert_eq!(render_str(source, &context), "user|");
}

#[test]
fn test_for_loop_with_empty_and_nested_paths() {
    let source = "{% for p in projects %}{{ p.title }}:{% for t in p.tags %}{{ t }};{% endfor %} {% empty %}nothing{% endfor %}";
    let project = TemplateValue::Object(HashMap::new())
        .with("title", "Crate")
        .with("tags", vec!["rust", "sqlite"]);
    let mut context = HashMap::new();
    context.insert("projects".to_string(), TemplateValue::List(vec![project]));
    assert_eq!(render_str(source, &context), "Crate:rust;sqlite; ");

    context.insert("projects".to_string(), TemplateValue::List(vec![]));
    assert_eq!(render_str(source, &context), "nothing");
}

#[test]
fn test_escaping_and_filters() {
    let mut context = HashMap::new();
    context.insert("bio".to_string(), TemplateValue::from("<b>Hi</b> & bye"));
    context.insert("review".to_string(), TemplateValue::from("one\n<two>"));
    context.insert("blank".to_string(), TemplateValue::from(""));

    assert_eq!(render_str("{{ bio }}", &context), "&lt;b&gt;Hi&lt;/b&gt; &amp; bye");
    assert_eq!(render_str("{{ bio|safe }}", &context), "<b>Hi</b> & bye");
    assert_eq!(render_str("{{ review|linebreaksbr }}", &context), "one<br>&lt;two&gt;");
    assert_eq!(render_str("{{ blank|default:\"n/a\" }}", &context), "n/a");
    assert_eq!(render_str("{{ missing|default:\"n/a\" }}", &context), "n/a");
}

#[test]
fn test_numbers_render_without_trailing_zero() {
    let mut context = HashMap::new();
    context.insert("year".to_string(), TemplateValue::from(2025));
    context.insert("zero".to_string(), TemplateValue::from(0));
    assert_eq!(render_str("{{ year }}", &context), "2025");
    assert_eq!(render_str("{% if zero %}yes{% else %}no{% endif %}", &context), "no");
}

#[test]
fn test_from_serialize_keeps_nulls_and_bools() {
    #[derive(serde::Serialize)]
    struct Row {
        title: String,
        live_url: Option<String>,
        featured: bool,
    }
    let value = TemplateValue::from_serialize(&Row {
        title: "x".into(),
        live_url: None,
        featured: true,
    });
    let TemplateValue::Object(map) = value else {
        panic!("Expected object");
    };
    assert_eq!(map["live_url"], TemplateValue::Null);
    assert_eq!(map["featured"], TemplateValue::Bool(true));
}

#[test]
fn test_livereload_tag_only_with_url() {
    let nodes = vec![Node::Text("start".into()), Node::LiveReload, Node::Text("end".into())];
    let html = render_nodes(&nodes, &HashMap::new());
    assert_eq!(html, "startend");

    let mut context = HashMap::new();
    context.insert(
        "livereload_url".to_string(),
        TemplateValue::from("ws://127.0.0.1:8001/ws/reload"),
    );
    let html = render_nodes(&nodes, &context);
    assert!(html.contains("new WebSocket(\"ws://127.0.0.1:8001/ws/reload\")"));
}

#[test]
fn test_block_and_extends_logic() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("pages")).unwrap();
    fs::write(
        dir.path().join("base.html"),
        "<title>{% block title %}Site{% endblock %}</title>{% block content %}Base{% endblock %}!",
    )
    .unwrap();
    fs::write(
        dir.path().join("pages/child.html"),
        "{% extends \"base.html\" %}{% block content %}Hello {{ name }}{% endblock %}",
    )
    .unwrap();

    let mut context = HashMap::new();
    context.insert("name".to_string(), TemplateValue::from("Ada"));
    let resp = render_template(dir.path(), "pages/child.html", &context);

    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.body, "<title>Site</title>Hello Ada!");
}

#[test]
fn test_template_not_found_branch() {
    let dir = tempfile::tempdir().unwrap();
    let resp = render_template(dir.path(), "hopefully_does_not_exist_zzz999.html", &HashMap::new());
    assert_eq!(resp.status_code, 500);
    assert!(resp.body.contains("not found"));
}

#[test]
fn test_unknown_tag_is_skipped() {
    let tokens = vec![
        Token::Tag("unknown_tag whatisthis".into()),
        Token::Text("after".into()),
    ];
    let nodes = parse_tokens(&tokens);
    assert_eq!(nodes.len(), 1);
    assert!(matches!(&nodes[0], Node::Text(t) if t == "after"));
}

#[test]
fn test_template_logging_coverage() {
    set_display_logs(true);
    let dir = tempfile::tempdir().unwrap();
    let _ = render_template(dir.path(), "hopefully_does_not_exist_zzz999.html", &HashMap::new());
    set_display_logs(false);
}
