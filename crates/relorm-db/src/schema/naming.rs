//! Naming conventions shared by the schema and the join planner.
//!
//! Model names are `PascalCase`; table names are their pluralized
//! `snake_case` form (`BlogPost` -> `blog_posts`). Junction tables for
//! many-to-many relations are derived from both model names so that either
//! side computes the same name.

/// Converts `camelCase` or `PascalCase` to `snake_case`.
///
/// Acronyms are kept together: `XMLHttpRequest` -> `xml_http_request`.
///
/// # Examples
///
/// ```
/// use relorm_db::schema::naming::camel_to_snake;
///
/// assert_eq!(camel_to_snake("BlogPost"), "blog_post");
/// assert_eq!(camel_to_snake("userId"), "user_id");
/// ```
pub fn camel_to_snake(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Returns a simple English plural of a lowercase word.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let word = word.to_lowercase();

    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y') {
        if stem.chars().last().is_some_and(|c| !is_vowel(c)) {
            return format!("{stem}ies");
        }
    }
    if let Some(stem) = word.strip_suffix('f') {
        return format!("{stem}ves");
    }
    if let Some(stem) = word.strip_suffix("fe") {
        return format!("{stem}ves");
    }
    format!("{word}s")
}

/// Reverses the two common plural forms used for table names.
pub fn singularize(table: &str) -> String {
    if let Some(stem) = table.strip_suffix("ies") {
        format!("{stem}y")
    } else if let Some(stem) = table.strip_suffix('s') {
        stem.to_string()
    } else {
        table.to_string()
    }
}

/// Returns the default table name for a model name.
pub fn model_name_to_table_name(model: &str) -> String {
    pluralize(&camel_to_snake(model))
}

/// Returns the junction table name for a many-to-many relation.
///
/// The name does not depend on which side declares the relation:
/// models are ordered case-insensitively and the first one is singularized.
///
/// # Examples
///
/// ```
/// use relorm_db::schema::naming::junction_table_name;
///
/// assert_eq!(junction_table_name("Tag", "Post"), "post_tags");
/// assert_eq!(junction_table_name("Post", "Tag"), "post_tags");
/// ```
pub fn junction_table_name(model_a: &str, model_b: &str) -> String {
    if model_a == model_b {
        let table = model_name_to_table_name(model_a);
        let single = table.strip_suffix('s').unwrap_or(&table);
        return format!("{single}_{table}");
    }

    let (first, second) = if model_a.to_lowercase() > model_b.to_lowercase() {
        (model_b, model_a)
    } else {
        (model_a, model_b)
    };
    format!(
        "{}_{}",
        singularize(&model_name_to_table_name(first)),
        model_name_to_table_name(second)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake(""), "");
        assert_eq!(camel_to_snake("User"), "user");
        assert_eq!(camel_to_snake("createdAt"), "created_at");
        assert_eq!(camel_to_snake("XMLHttpRequest"), "xml_http_request");
        assert_eq!(camel_to_snake("address2Line"), "address2_line");
        assert_eq!(camel_to_snake("already_snake"), "already_snake");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("status"), "statuses");
        assert_eq!(pluralize("branch"), "branches");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("leaf"), "leaves");
        assert_eq!(pluralize("knife"), "knives");
        assert_eq!(pluralize(""), "");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("data"), "data");
    }

    #[test]
    fn test_model_name_to_table_name() {
        assert_eq!(model_name_to_table_name("User"), "users");
        assert_eq!(model_name_to_table_name("BlogPost"), "blog_posts");
        assert_eq!(model_name_to_table_name("Category"), "categories");
    }

    #[test]
    fn test_junction_table_name_is_symmetric() {
        assert_eq!(junction_table_name("Post", "Tag"), "post_tags");
        assert_eq!(junction_table_name("Tag", "Post"), "post_tags");
        assert_eq!(
            junction_table_name("Product", "Category"),
            "category_products"
        );
    }

    #[test]
    fn test_junction_table_name_self_relation() {
        assert_eq!(junction_table_name("User", "User"), "user_users");
    }
}
