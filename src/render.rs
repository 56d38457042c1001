//! HTML rendering for the index and directory listings

use crate::proxy::DirectoryListing;

/// Index page data
#[derive(Debug, Clone)]
pub struct IndexPage<'a> {
    pub authorized: bool,
    pub login: Option<&'a str>,
    pub client_id: &'a str,
}

pub fn render_index(page: &IndexPage<'_>) -> String {
    let status = match (page.authorized, page.login) {
        (true, Some(login)) => format!(
            "<p>Signed in as <strong>{}</strong>. <a href=\"/_logout\">Sign out</a></p>",
            html_escape::encode_text(login)
        ),
        (true, None) => "<p>Signed in. <a href=\"/_logout\">Sign out</a></p>".to_string(),
        (false, _) => "<p><a href=\"/_login\">Sign in with GitHub</a></p>".to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <meta name="github-client-id" content="{}" />
  <title>gitgate</title>
</head>
<body data-authorized="{}">
  <h1>gitgate</h1>
  {}
</body>
</html>"#,
        html_escape::encode_double_quoted_attribute(page.client_id),
        page.authorized,
        status,
    )
}

pub fn render_tree(listing: &DirectoryListing) -> String {
    let title = format!("{}/{}/{}", listing.owner, listing.repo, listing.subpath);

    let mut items = Vec::with_capacity(listing.folders.len() + listing.files.len() + 1);
    if !listing.subpath.is_empty() {
        items.push("<li><a href=\"../\">..</a></li>".to_string());
    }
    items.extend(
        listing
            .folders
            .iter()
            .map(|folder| render_item(&format!("{folder}/"), "folder")),
    );
    items.extend(listing.files.iter().map(|file| render_item(file, "file")));

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title}</title>
</head>
<body>
  <h1>{title}</h1>
  <ul>
    {items}
  </ul>
</body>
</html>"#,
        title = html_escape::encode_text(&title),
        items = items.join("\n    "),
    )
}

fn render_item(name: &str, class: &str) -> String {
    let href = name
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    format!(
        "<li class=\"{}\"><a href=\"{}\">{}</a></li>",
        class,
        html_escape::encode_double_quoted_attribute(&href),
        html_escape::encode_text(name),
    )
}
