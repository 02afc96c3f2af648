//! Recipe record extraction
//!
//! Reads the WP Recipe Maker card most recipe blogs render, falling back to
//! schema.org `Recipe` JSON-LD when the card is absent.

use crate::extract::{ExtractError, RecordExtractor};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::Value;
use url::Url;

/// Structured recipe record stored as the details-stage payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipe {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub metadata: Vec<String>,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<String>>,
}

/// Default recipe extractor
#[derive(Debug, Default, Clone)]
pub struct RecipeExtractor;

impl RecordExtractor for RecipeExtractor {
    fn extract(&self, url: &Url, html: &str) -> Result<Value, ExtractError> {
        let document = Html::parse_document(html);

        let recipe = if has_recipe_card(&document) {
            from_recipe_card(&document, url)?
        } else if let Some(ld) = find_json_ld_recipe(&document) {
            from_json_ld(&document, &ld, url)?
        } else {
            return Err(ExtractError::NotARecipe(
                "no recipe card or Recipe JSON-LD".to_string(),
            ));
        };

        serde_json::to_value(&recipe)
            .map_err(|e| ExtractError::NotARecipe(format!("unserializable record: {}", e)))
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn has_recipe_card(document: &Html) -> bool {
    [".wprm-recipe-ingredient", ".wprm-recipe-instruction"]
        .iter()
        .filter_map(|css| selector(css))
        .any(|s| document.select(&s).next().is_some())
}

fn from_recipe_card(document: &Html, url: &Url) -> Result<Recipe, ExtractError> {
    let title = first_text(document, ".wprm-recipe-name")
        .or_else(|| first_text(document, "h1"))
        .or_else(|| first_text(document, "title"))
        .ok_or(ExtractError::MissingField("title"))?;

    let ingredients = all_text(document, ".wprm-recipe-ingredient", &["wprm-checkbox-container"]);
    if ingredients.is_empty() {
        return Err(ExtractError::MissingField("ingredients"));
    }

    let instructions = all_text(document, ".wprm-recipe-instruction", &[]);
    if instructions.is_empty() {
        return Err(ExtractError::MissingField("instructions"));
    }

    Ok(Recipe {
        url: url.to_string(),
        title,
        summary: first_text(document, ".wprm-recipe-summary"),
        metadata: all_text(document, ".wprm-recipe-meta-container > div", &[]),
        ingredients,
        instructions,
        nutrition: non_empty(all_text(
            document,
            ".wprm-nutrition-label-text-nutrition-container",
            &[],
        )),
        comments: comments(document),
    })
}

fn from_json_ld(document: &Html, ld: &Value, url: &Url) -> Result<Recipe, ExtractError> {
    let title = ld
        .get("name")
        .and_then(Value::as_str)
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
        .ok_or(ExtractError::MissingField("title"))?;

    let ingredients: Vec<String> = ld
        .get("recipeIngredient")
        .map(strings)
        .unwrap_or_default();
    if ingredients.is_empty() {
        return Err(ExtractError::MissingField("ingredients"));
    }

    let mut instructions = Vec::new();
    if let Some(value) = ld.get("recipeInstructions") {
        collect_instructions(value, &mut instructions);
    }
    if instructions.is_empty() {
        return Err(ExtractError::MissingField("instructions"));
    }

    let metadata = ["recipeYield", "prepTime", "cookTime", "totalTime", "recipeCategory", "recipeCuisine"]
        .iter()
        .filter_map(|key| {
            let values = ld.get(*key).map(strings).unwrap_or_default();
            (!values.is_empty()).then(|| format!("{}: {}", key, values.join(", ")))
        })
        .collect();

    let nutrition = ld.get("nutrition").and_then(Value::as_object).map(|map| {
        map.iter()
            .filter(|(key, _)| !key.starts_with('@'))
            .filter_map(|(key, value)| value.as_str().map(|v| format!("{}: {}", key, v)))
            .collect::<Vec<_>>()
    });

    Ok(Recipe {
        url: url.to_string(),
        title,
        summary: ld
            .get("description")
            .and_then(Value::as_str)
            .map(collapse_whitespace)
            .filter(|s| !s.is_empty()),
        metadata,
        ingredients,
        instructions,
        nutrition: nutrition.and_then(non_empty),
        comments: comments(document),
    })
}

fn comments(document: &Html) -> Option<Vec<String>> {
    non_empty(all_text(
        document,
        ".comment-list li article",
        &["reply", "comment-metadata"],
    ))
}

/// Finds the first JSON-LD node typed `Recipe`
fn find_json_ld_recipe(document: &Html) -> Option<Value> {
    let scripts = selector(r#"script[type="application/ld+json"]"#)?;
    document
        .select(&scripts)
        .filter_map(|script| serde_json::from_str::<Value>(&script.text().collect::<String>()).ok())
        .find_map(|value| find_recipe_node(&value).cloned())
}

fn find_recipe_node(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_recipe_node),
        Value::Object(map) => {
            if is_recipe_type(map.get("@type")) {
                return Some(value);
            }
            map.get("@graph").and_then(find_recipe_node)
        }
        _ => None,
    }
}

fn is_recipe_type(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(t)) => t == "Recipe",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Recipe")),
        _ => false,
    }
}

fn collect_instructions(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => out.extend(
            text.lines()
                .map(collapse_whitespace)
                .filter(|line| !line.is_empty()),
        ),
        Value::Array(items) => {
            for item in items {
                collect_instructions(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(steps) = map.get("itemListElement") {
                collect_instructions(steps, out);
            } else if let Some(text) = map.get("text").or_else(|| map.get("name")) {
                collect_instructions(text, out);
            }
        }
        _ => {}
    }
}

fn strings(value: &Value) -> Vec<String> {
    let values = match value {
        Value::String(s) => vec![collapse_whitespace(s)],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.iter().flat_map(strings).collect(),
        _ => Vec::new(),
    };
    values.into_iter().filter(|s| !s.is_empty()).collect()
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let s = selector(css)?;
    document
        .select(&s)
        .map(|element| text_excluding(element, &[]))
        .find(|text| !text.is_empty())
}

fn all_text(document: &Html, css: &str, excluded_classes: &[&str]) -> Vec<String> {
    let Some(s) = selector(css) else {
        return Vec::new();
    };
    document
        .select(&s)
        .map(|element| text_excluding(element, excluded_classes))
        .filter(|text| !text.is_empty())
        .collect()
}

/// Text of `element` without the subtrees carrying any excluded class
fn text_excluding(element: ElementRef<'_>, excluded_classes: &[&str]) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != element.id())
            .filter_map(ElementRef::wrap)
            .any(|ancestor| {
                ancestor
                    .value()
                    .classes()
                    .any(|class| excluded_classes.contains(&class))
            });
        if !hidden {
            text.push_str(chunk);
        }
    }
    collapse_whitespace(&text)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/lemon-bars/").unwrap()
    }

    const CARD: &str = r#"
<html><head><title>Lemon Bars | Example</title></head><body>
<div class="wprm-recipe">
  <h2 class="wprm-recipe-name">Lemon Bars</h2>
  <div class="wprm-recipe-summary"><span>Tart and   sweet.</span></div>
  <div class="wprm-recipe-meta-container">
    <div>Prep Time <span>15 mins</span></div>
    <div>Servings <span>16</span></div>
  </div>
  <ul>
    <li class="wprm-recipe-ingredient"><span class="wprm-checkbox-container">[ ]</span><span>1</span> <span>cup</span> <span>flour</span></li>
    <li class="wprm-recipe-ingredient"><span>2</span> <span>lemons</span></li>
  </ul>
  <ul>
    <li class="wprm-recipe-instruction"><div>Mix the crust.</div></li>
    <li class="wprm-recipe-instruction"><div>Bake 20 minutes.</div></li>
  </ul>
  <div class="wprm-nutrition-label-text-nutrition-container">Calories: 120kcal</div>
</div>
<ol class="comment-list">
  <li><article><p>So good!</p><div class="comment-metadata">May 1</div><a class="reply">Reply</a></article></li>
</ol>
</body></html>
"#;

    #[test]
    fn test_recipe_card() {
        let record = RecipeExtractor.extract(&url(), CARD).unwrap();

        assert_eq!(record["title"], "Lemon Bars");
        assert_eq!(record["url"], "https://example.com/lemon-bars/");
        assert_eq!(record["summary"], "Tart and sweet.");
        assert_eq!(
            record["ingredients"],
            serde_json::json!(["1 cup flour", "2 lemons"])
        );
        assert_eq!(
            record["instructions"],
            serde_json::json!(["Mix the crust.", "Bake 20 minutes."])
        );
        assert_eq!(
            record["metadata"],
            serde_json::json!(["Prep Time 15 mins", "Servings 16"])
        );
        assert_eq!(record["nutrition"], serde_json::json!(["Calories: 120kcal"]));
        assert_eq!(record["comments"], serde_json::json!(["So good!"]));
    }

    #[test]
    fn test_card_without_instructions_is_missing_field() {
        let html = r#"<h1>Toast</h1><li class="wprm-recipe-ingredient">bread</li>"#;
        assert_eq!(
            RecipeExtractor.extract(&url(), html),
            Err(ExtractError::MissingField("instructions"))
        );
    }

    #[test]
    fn test_json_ld_graph() {
        let html = r#"
<html><head><script type="application/ld+json">
{"@context": "https://schema.org", "@graph": [
  {"@type": "WebPage", "name": "Soup page"},
  {"@type": ["Recipe"], "name": "Tomato Soup",
   "description": "Weeknight soup.",
   "recipeYield": ["4", "4 bowls"],
   "recipeIngredient": ["4 tomatoes", "1 onion"],
   "recipeInstructions": [
     {"@type": "HowToSection", "name": "Prep", "itemListElement": [
       {"@type": "HowToStep", "text": "Chop the onion."}
     ]},
     {"@type": "HowToStep", "text": "Simmer   everything."}
   ],
   "nutrition": {"@type": "NutritionInformation", "calories": "90 kcal"}}
]}
</script></head><body></body></html>
"#;
        let record = RecipeExtractor.extract(&url(), html).unwrap();

        assert_eq!(record["title"], "Tomato Soup");
        assert_eq!(record["ingredients"], serde_json::json!(["4 tomatoes", "1 onion"]));
        assert_eq!(
            record["instructions"],
            serde_json::json!(["Chop the onion.", "Simmer everything."])
        );
        assert_eq!(record["metadata"], serde_json::json!(["recipeYield: 4, 4 bowls"]));
        assert_eq!(record["nutrition"], serde_json::json!(["calories: 90 kcal"]));
        assert!(record.get("comments").is_none());
    }

    #[test]
    fn test_plain_page_is_not_a_recipe() {
        let html = "<html><body><h1>About us</h1></body></html>";
        assert!(matches!(
            RecipeExtractor.extract(&url(), html),
            Err(ExtractError::NotARecipe(_))
        ));
    }
}
