use kiln::{
    loader::{FileSystemLoader, MemoryLoader},
    Engine, Store, UndefinedBehavior,
};
use serde::Serialize;
use serde_json::json;
use std::{fs, thread};

#[test]
fn test_greeting() {
    let store = Store::new().with_must("name", "Alice").with_must("count", 5);
    assert_eq!(
        render("Hello {{ name|upper }}! You have {{ count }} messages.", &store),
        "Hello ALICE! You have 5 messages."
    );
}

#[test]
fn test_precedence() {
    let store = Store::new()
        .with_must("a", 1)
        .with_must("b", 2)
        .with_must("c", 3);
    assert_eq!(render("{{ a + b * c }}", &store), "7");
    assert_eq!(render("{{ (a + b) * c }}", &store), "9");
    assert_eq!(render("{{ 2 ** 3 ** 2 }}", &store), "512");
    assert_eq!(render("{{ 'x' if a > b else 'y' }}", &store), "y");
    assert_eq!(render("{{ not a == b and c in [3] }}", &store), "True");
}

#[test]
fn test_whitespace_control() {
    let store = Store::new().with_must("name", "X");
    assert_eq!(render("text \n{{- name }}", &store), "textX");
    assert_eq!(render("text \n{{+ name }}", &store), "text \nX");
    assert_eq!(render("{{ name -}}  \n  !", &store), "X!");

    let engine = Engine::default()
        .with_trim_blocks(true)
        .with_lstrip_blocks(true);
    let template = engine
        .compile("<ul>\n  {% for i in [1, 2] %}\n  <li>{{ i }}</li>\n  {% endfor %}\n</ul>")
        .unwrap();
    assert_eq!(
        engine.render(&template, &Store::new()).unwrap(),
        "<ul>\n  <li>1</li>\n  <li>2</li>\n</ul>"
    );
}

#[test]
fn test_inheritance_super() {
    let engine = Engine::default()
        .with_template("base", "{% block content %}A{% endblock %}")
        .unwrap()
        .with_template(
            "child",
            "{% extends 'base' %} {% block content %}{{ super() }}B{% endblock %}",
        )
        .unwrap();
    assert_eq!(engine.render_named("child", &Store::new()).unwrap(), "AB");

    let child = engine.get_template("child").unwrap();
    assert_eq!(child.extends(), Some("base"));
    assert_eq!(child.block_names().collect::<Vec<_>>(), vec!["content"]);
}

#[test]
fn test_fibonacci() {
    let template = "{% macro fib(n) %}{% if n < 2 %}{{ n }}{% else %}\
        {{ fib(n - 1)|int + fib(n - 2)|int }}{% endif %}{% endmacro %}\
        {% for i in range(11) %}{{ fib(i) }}{% if not loop.last %},{% endif %}{% endfor %}";
    assert_eq!(
        render(template, &Store::new()),
        "0,1,1,2,3,5,8,13,21,34,55"
    );
}

#[test]
fn test_recursion_limit() {
    let sources = [
        "{% macro down(n) %}{{ down(n + 1) }}{% endmacro %}{{ down(0) }}",
        "{% macro down(n) %}{% for i in [1] %}{% if true %}{% filter upper %}\
        {% set x %}{{ down(n + 1)|trim }}{% endset %}{{ x }}\
        {% endfilter %}{% endif %}{% endfor %}{% endmacro %}{{ down(0) }}",
    ];

    // Worker threads often get no more than 2 MiB of stack.
    let result = thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(move || {
            let engine = Engine::default();
            sources
                .iter()
                .map(|source| {
                    let template = engine.compile(source).unwrap();
                    engine.render(&template, &Store::new()).unwrap_err().kind()
                })
                .collect::<Vec<_>>()
        })
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(result, vec![kiln::ErrorKind::Recursion; 2]);
}

#[test]
fn test_deep_nesting() {
    let depth = 500;
    let source = format!(
        "{}x{}{{{{ {}1{} }}}}",
        "{% if true %}".repeat(depth),
        "{% endif %}".repeat(depth),
        "(".repeat(depth),
        ")".repeat(depth),
    );

    let result = thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(move || render(&source, &Store::new()))
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(result, "x1");
}

#[test]
fn test_undefined_behavior() {
    let lenient = Engine::default();
    let template = lenient.compile("[{{ missing }}]").unwrap();
    assert_eq!(lenient.render(&template, &Store::new()).unwrap(), "[]");

    let strict = Engine::default().with_undefined(UndefinedBehavior::Strict);
    let template = strict.compile("[{{ missing }}]").unwrap();
    let error = strict.render(&template, &Store::new()).unwrap_err();
    assert_eq!(error.kind(), kiln::ErrorKind::Undefined);

    let template = strict
        .compile("{% if missing is defined %}yes{% else %}no{% endif %}")
        .unwrap();
    assert_eq!(strict.render(&template, &Store::new()).unwrap(), "no");
}

#[test]
fn test_idempotent() {
    let engine = Engine::default();
    let template = engine
        .compile(
            "{% set ns = namespace(total=0) %}{% for x in items %}\
            {% set ns.total = ns.total + x %}{% endfor %}{{ ns.total }}|{{ counter() }}",
        )
        .unwrap();
    let store = Store::new().with_must("items", vec![1, 2, 3]);
    let engine = engine.with_function_must(
        "counter",
        |_: &kiln::filter::Arguments| -> Result<kiln::Value, kiln::Error> {
            Ok(kiln::Value::from("c"))
        },
    );

    let first = engine.render(&template, &store).unwrap();
    let second = engine.render(&template, &store).unwrap();
    assert_eq!(first, "6|c");
    assert_eq!(first, second);
}

#[test]
fn test_concurrent_renders() {
    let engine = Engine::default();
    let template = engine
        .compile("{% for i in range(n) %}{{ i }}{% endfor %}")
        .unwrap();

    thread::scope(|scope| {
        let handles = (0..4)
            .map(|n| {
                let engine = &engine;
                let template = &template;
                scope.spawn(move || engine.render(template, &Store::new().with_must("n", n)))
            })
            .collect::<Vec<_>>();

        for (n, handle) in handles.into_iter().enumerate() {
            let expected = (0..n).map(|i| i.to_string()).collect::<String>();
            assert_eq!(handle.join().unwrap().unwrap(), expected);
        }
    });
}

#[test]
fn test_render_to() {
    let engine = Engine::default();
    let mut sink = Vec::new();

    let failing = engine.compile("header {{ 10 / 0 }} footer").unwrap();
    let error = engine
        .render_to(&failing, &Store::new(), &mut sink)
        .unwrap_err();
    assert_eq!(error.kind(), kiln::ErrorKind::ZeroDivision);
    assert!(sink.is_empty());

    let template = engine.compile("{{ 10 // 3 }} {{ 10 / 4 }}").unwrap();
    engine.render_to(&template, &Store::new(), &mut sink).unwrap();
    assert_eq!(String::from_utf8(sink).unwrap(), "3 2.5");
}

#[test]
fn test_macros_and_imports() {
    let loader = MemoryLoader::new()
        .with_template(
            "macros",
            "{% macro field(name, kind='text', *, required=false) %}\
            <input name=\"{{ name }}\" type=\"{{ kind }}\"{{ ' required' if required }}>\
            {% endmacro %}",
        )
        .with_template(
            "form",
            "{% from 'macros' import field %}{{ field('user') }}\
            {{ field('pass', 'password', required=true) }}",
        );
    let engine = Engine::default().with_loader(loader);

    assert_eq!(
        engine.render_named("form", &Store::new()).unwrap(),
        "<input name=\"user\" type=\"text\">\
        <input name=\"pass\" type=\"password\" required>"
    );
}

#[test]
fn test_file_system_loader() {
    let dir = std::env::temp_dir().join(format!("kiln-render-{}", std::process::id()));
    fs::create_dir_all(dir.join("layouts")).unwrap();
    fs::write(
        dir.join("layouts/base.html"),
        "<title>{% block title %}{% endblock %}</title>",
    )
    .unwrap();
    fs::write(
        dir.join("index.html"),
        "{% extends 'layouts/base.html' %}{% block title %}{{ page.title }}{% endblock %}",
    )
    .unwrap();

    #[derive(Serialize)]
    struct Page {
        title: String,
    }

    let engine = Engine::default()
        .with_autoescape(kiln::Autoescape::Extensions(vec!["html".into()]))
        .with_loader(FileSystemLoader::new(&dir));
    let store = Store::new().with_must(
        "page",
        Page {
            title: "Tom & Jerry".into(),
        },
    );
    let result = engine.render_named("index.html", &store);
    fs::remove_dir_all(&dir).unwrap();

    assert_eq!(result.unwrap(), "<title>Tom &amp; Jerry</title>");
}

#[test]
fn test_trans() {
    let engine = Engine::default().with_translator(
        kiln::i18n::Catalog::new()
            .with_message("Hello %(user)s!", "Hallo %(user)s!")
            .with_plural("%(count)s apple", ["%(count)s Apfel", "%(count)s Äpfel"]),
    );
    let template = engine
        .compile(
            "{% trans user=name %}Hello {{ user }}!{% endtrans %} \
            {% trans count=n %}{{ count }} apple{% pluralize %}{{ count }} apples{% endtrans %}",
        )
        .unwrap();
    let store = Store::new().with_must("name", "Ann").with_must("n", 2);

    assert_eq!(
        engine.render(&template, &store).unwrap(),
        "Hallo Ann! 2 Äpfel"
    );
}

#[test]
fn test_loops() {
    let store = Store::new().with_must(
        "users",
        json!([
            {"name": "ann", "group": "a"},
            {"name": "bo", "group": "b"},
            {"name": "cy", "group": "a"}
        ]),
    );
    assert_eq!(
        render(
            "{% for group in users|groupby('group') %}{{ group.grouper }}:\
            {% for user in group.list %}{{ user.name }}{{ ',' if not loop.last }}{% endfor %};\
            {% endfor %}",
            &store
        ),
        "a:ann,cy;b:bo;"
    );
    assert_eq!(
        render(
            "{% for k, v in {'x': 1, 'y': 2}.items() %}{{ k }}={{ v }} {% endfor %}",
            &store
        ),
        "x=1 y=2 "
    );
}

fn render(text: &str, store: &Store) -> String {
    let engine = Engine::default();
    let template = engine.compile(text).unwrap();
    engine.render(&template, store).unwrap()
}
