// tests/scenarios.rs

//! End-to-end rewrite scenarios across resource kinds.

mod common;

use common::{entry_names, filter_class, jar, read_entries, rules, transformer};
use nsmigrate::{ActionKind, RuleSet, TransformConfig, Transformer};

const MANIFEST: &[u8] = b"Manifest-Version: 1.0\r\n\
Bundle-SymbolicName: com.acme.web\r\n\
Import-Package: javax.servlet;version=\"[3.1,4)\",javax.servlet.http;version=\"[3.1,4)\"\r\n\
\r\n";

const WEB_XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<web-app version="4.0">
  <servlet>
    <servlet-name>main</servlet-name>
    <servlet-class>com.example.MainServlet</servlet-class>
  </servlet>
  <listener><listener-class>javax.servlet.ServletContextListener</listener-class></listener>
</web-app>
"#;

fn war() -> Vec<u8> {
    jar(&[
        ("META-INF/MANIFEST.MF", MANIFEST),
        ("WEB-INF/web.xml", WEB_XML),
        ("WEB-INF/classes/com/acme/web/A.class", &filter_class("A")),
        (
            "META-INF/services/javax.servlet.ServletContainerInitializer",
            b"com.example.Initializer\n",
        ),
        ("index.jsp", b"<%@ page import=\"javax.servlet.http.Cookie\" %>\n"),
        ("WEB-INF/classes/messages.properties", b"greeting=Hello\n"),
    ])
}

// =============================================================================
// Rename semantics
// =============================================================================

#[test]
fn test_prefix_correctness() {
    let rules = rules();
    assert_eq!(
        rules.rename_package("javax.servlet.http.HttpServletRequest").as_deref(),
        Some("jakarta.servlet.http.HttpServletRequest")
    );
    assert_eq!(rules.rename_package("javax.servletx.Foo"), None);

    let output = transformer().transform(
        "a.properties",
        b"a=javax.servlet.http.HttpServletRequest\nb=javax.servletx.Foo\n",
    );
    assert_eq!(
        output.data,
        b"a=jakarta.servlet.http.HttpServletRequest\nb=javax.servletx.Foo\n"
    );
    assert_eq!(output.changes.changed_providers(), 1);
    assert_eq!(output.changes.unchanged_providers(), 1);
}

#[test]
fn test_longest_prefix_wins() {
    let rules = RuleSet::builder()
        .rename("com.foo", "org.foo")
        .rename("com.foo.bar", "net.bar")
        .build()
        .unwrap();
    assert_eq!(rules.rename_package("com.foo.bar.Baz").as_deref(), Some("net.bar.Baz"));
    assert_eq!(rules.rename_package("com.foo.Qux").as_deref(), Some("org.foo.Qux"));
}

#[test]
fn test_service_config_rename() {
    let input = jar(&[("META-INF/services/com.example.OldIface", b"com.example.OldImpl\n")]);
    let output = transformer().transform("lib.jar", &input);

    let entries = read_entries(&output.data);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "META-INF/services/com.sample.OldIface");
    assert_eq!(entries[0].data, b"com.sample.OldImpl\n");

    let ledger = &output.changes.entries()[0];
    assert_eq!(ledger.kind(), Some(ActionKind::ServiceConfig));
    assert_eq!(ledger.input_name(), "META-INF/services/com.example.OldIface");
    assert_eq!(ledger.output_name(), "META-INF/services/com.sample.OldIface");
    assert_eq!(output.changes.renamed_entries(), 1);
}

// =============================================================================
// Whole archive
// =============================================================================

#[test]
fn test_web_application() {
    let output = transformer().transform("app.war", &war());
    assert!(!output.changes.is_failed());

    let names = entry_names(&output.data);
    assert_eq!(
        names,
        vec![
            "META-INF/MANIFEST.MF",
            "WEB-INF/web.xml",
            "WEB-INF/classes/com/acme/web/A.class",
            "META-INF/services/jakarta.servlet.ServletContainerInitializer",
            "index.jsp",
            "WEB-INF/classes/messages.properties",
        ]
    );

    let entries = read_entries(&output.data);
    let manifest = String::from_utf8(entries[0].data.clone()).unwrap();
    let unfolded = manifest.replace("\r\n ", "");
    assert!(unfolded.contains(
        "Import-Package: jakarta.servlet;version=\"[5.0,6)\",jakarta.servlet.http;version=\"[3.1,4)\""
    ));

    let web_xml = String::from_utf8(entries[1].data.clone()).unwrap();
    assert!(web_xml.contains("<servlet-class>com.sample.MainServlet</servlet-class>"));
    assert!(web_xml.contains("<listener-class>jakarta.servlet.ServletContextListener</listener-class>"));
    assert!(web_xml.contains(r#"<web-app version="4.0">"#));

    assert_eq!(entries[3].data, b"com.sample.Initializer\n");
    assert_eq!(
        entries[4].data,
        b"<%@ page import=\"jakarta.servlet.http.Cookie\" %>\n"
    );
    assert_eq!(entries[5].data, b"greeting=Hello\n");

    let kinds: Vec<Option<ActionKind>> = output.changes.entries().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            Some(ActionKind::Manifest),
            Some(ActionKind::Xml),
            Some(ActionKind::Class),
            Some(ActionKind::ServiceConfig),
            Some(ActionKind::Text),
            Some(ActionKind::Properties),
        ]
    );
}

#[test]
fn test_xml_ledger_counts_replacements() {
    let output = transformer().transform("WEB-INF/web.xml", WEB_XML);
    assert_eq!(output.changes.kind(), Some(ActionKind::Xml));
    // servlet-class and listener-class text nodes
    assert_eq!(output.changes.changed_providers(), 2);
    // version attribute and servlet-name text
    assert_eq!(output.changes.unchanged_providers(), 2);
}

#[test]
fn test_second_pass_makes_no_changes() {
    let transformer = transformer();
    let first = transformer.transform("app.war", &war());
    let second = transformer.transform("app.war", &first.data);

    assert_eq!(second.data, first.data);
    assert_eq!(second.changes.total_changed_providers(), 0);
    assert!(!second.changes.has_changes());
}

#[test]
fn test_runs_are_deterministic() {
    let a = transformer().transform("app.war", &war());
    let b = transformer().transform("app.war", &war());
    assert_eq!(a.data, b.data);
    assert_eq!(a.changes.total_changed_providers(), b.changes.total_changed_providers());
    assert_eq!(a.changes.total_unchanged_providers(), b.changes.total_unchanged_providers());
}

#[test]
fn test_excluded_resources_are_untouched() {
    let config = TransformConfig::parse(
        r#"
exclude = ["WEB-INF/web.xml"]

[selection.text]
exclude = ["*.jsp"]
"#,
    )
    .unwrap();
    let transformer = Transformer::new(rules(), &config).unwrap();
    let output = transformer.transform("app.war", &war());

    let entries = read_entries(&output.data);
    assert_eq!(entries[1].data, WEB_XML);
    assert_eq!(
        entries[4].data,
        b"<%@ page import=\"javax.servlet.http.Cookie\" %>\n"
    );
    assert_eq!(transformer.resolve("index.jsp"), None);
}
