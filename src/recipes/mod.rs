//! Built-in recipe documents and the recipe search tool

use schemars::JsonSchema;
use serde::Deserialize;
use tower::BoxError;

use crate::core::{tool_typed, ToolDef};

pub const RAGU: &str = include_str!("ragu.md");
pub const PANCAKES: &str = include_str!("pancakes.md");

/// Returned by `search_recipe` when nothing matches.
pub const NO_RECIPE_FOUND: &str = "NO_RECIPE_FOUND";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchRecipeArgs {
    /// Title of the recipe to look up
    pub recipe_title: String,
}

pub fn search_recipe(title: &str) -> &'static str {
    if title.to_lowercase().contains("pancake") {
        PANCAKES
    } else {
        NO_RECIPE_FOUND
    }
}

pub fn search_recipe_tool() -> ToolDef {
    tool_typed(
        "search_recipe",
        "Search for recipes by title. Either returns the full text of a recipe, or a status code indicating that no recipe was found.",
        |args: SearchRecipeArgs| async move { Ok::<_, BoxError>(search_recipe(&args.recipe_title)) },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pancake_titles_match_in_any_case() {
        assert_eq!(search_recipe("Crêpe-style PANCAKES"), PANCAKES);
        assert!(PANCAKES.starts_with("# Pancakes"));
    }

    #[test]
    fn recipes_end_without_a_newline() {
        for recipe in [RAGU, PANCAKES] {
            assert!(!recipe.ends_with('\n'));
            assert_eq!(recipe, recipe.trim_end());
        }
    }

    #[test]
    fn other_titles_report_not_found() {
        assert_eq!(search_recipe("lasagne"), NO_RECIPE_FOUND);
    }

    #[test]
    fn tool_schema_names_the_title_parameter() {
        let tool = search_recipe_tool();
        assert_eq!(tool.name, "search_recipe");
        assert!(tool.parameters_schema["properties"]["recipe_title"].is_object());
    }
}
