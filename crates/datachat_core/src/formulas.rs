//! The business formulas the reasoning capability must follow, as a
//! versioned structure rather than free-form prose, so they can be validated
//! without involving the model.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Formula {
    pub name: &'static str,
    pub expression: &'static str,
    pub note: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinKey {
    pub from: &'static str,
    pub to: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalystRules {
    pub version: u32,
    pub formulas: Vec<Formula>,
    pub join_keys: Vec<JoinKey>,
}

impl AnalystRules {
    pub fn v1() -> Self {
        Self {
            version: 1,
            formulas: vec![
                Formula {
                    name: "revenue",
                    expression: "SUM(sales.quantity * products.price)",
                    note: "revenue MUST multiply sales.quantity by products.price",
                },
                Formula {
                    name: "margin",
                    expression: "SUM((products.price - products.cost) * sales.quantity)",
                    note: "profit/margin uses price minus cost, times quantity",
                },
                Formula {
                    name: "campaign_roi",
                    expression: "(total_campaign_revenue - campaigns.budget) / campaigns.budget",
                    note: "join sales with campaigns on campaign_id",
                },
            ],
            join_keys: vec![
                JoinKey { from: "sales.product_id", to: "products.id" },
                JoinKey { from: "sales.customer_id", to: "customers.id" },
                JoinKey { from: "sales.employee_id", to: "employees.id" },
                JoinKey { from: "sales.campaign_id", to: "campaigns.id" },
            ],
        }
    }

    /// Render the fixed instruction set for one chat turn. Plotting mode
    /// adds the mandatory create_plot mandate; otherwise the model is told
    /// to point the user at the plotting setting.
    pub fn render_prompt(&self, plotting_enabled: bool) -> String {
        let mut out = String::from("You are an expert data analyst.\n\nIMPORTANT RULES:\n");
        for (i, f) in self.formulas.iter().enumerate() {
            out.push_str(&format!(
                "{}. To calculate {}: {}. Formula: {}\n",
                i + 1,
                f.name.to_uppercase(),
                f.note,
                f.expression
            ));
        }
        let mut n = self.formulas.len();
        n += 1;
        out.push_str(&format!(
            "{n}. Always perform aggregations (SUM, AVG, COUNT) in the SQL query itself, never client-side.\n"
        ));
        n += 1;
        out.push_str(&format!("{n}. When joining tables:\n"));
        for jk in &self.join_keys {
            out.push_str(&format!("   - {} = {}\n", jk.from, jk.to));
        }
        n += 1;
        out.push_str(&format!(
            "{n}. If the user asks for a specific name (Product, Rep, Campaign), use a LIKE clause.\n"
        ));
        n += 1;
        out.push_str(&format!(
            "{n}. Always return the final answer as a complete sentence based on the SQL result.\n"
        ));
        n += 1;
        if plotting_enabled {
            out.push_str(&format!(
                "{n}. PLOTTING MODE IS ENABLED. You MUST generate a visualization for EVERY query that returns data.\n\
                 \x20  a) Execute the SQL query to get the data.\n\
                 \x20  b) Call the 'create_plot' tool with the data.\n\
                 \x20  c) The 'create_plot' tool returns a JSON string. You MUST include this exact JSON string in your final response, wrapped in ```json ... ``` blocks.\n\
                 \x20  d) DO NOT generate HTML, JS, or any other visualization code yourself. ONLY use the tool.\n"
            ));
        } else {
            out.push_str(&format!(
                "{n}. If the user explicitly asks for a visualization, explain that they need to enable the plotting feature in the settings.\n"
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_carries_the_three_formulas_and_four_join_keys() {
        let rules = AnalystRules::v1();
        assert_eq!(rules.version, 1);
        let names: Vec<_> = rules.formulas.iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["revenue", "margin", "campaign_roi"]);
        assert_eq!(rules.join_keys.len(), 4);
    }

    #[test]
    fn prompt_encodes_the_revenue_and_margin_expressions() {
        let prompt = AnalystRules::v1().render_prompt(false);
        assert!(prompt.contains("SUM(sales.quantity * products.price)"));
        assert!(prompt.contains("SUM((products.price - products.cost) * sales.quantity)"));
        assert!(prompt.contains("sales.campaign_id = campaigns.id"));
        assert!(prompt.contains("LIKE"));
    }

    #[test]
    fn plotting_flag_toggles_the_mandate() {
        let rules = AnalystRules::v1();
        let with = rules.render_prompt(true);
        let without = rules.render_prompt(false);
        assert!(with.contains("PLOTTING MODE IS ENABLED"));
        assert!(with.contains("```json"));
        assert!(!without.contains("PLOTTING MODE IS ENABLED"));
        assert!(without.contains("enable the plotting feature"));
    }
}
