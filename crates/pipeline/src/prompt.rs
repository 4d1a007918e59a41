//! Natural-language prompt construction for pipeline steps

use relay_core::WorkUnit;

use crate::config::{StepConfig, StepType};
use crate::error::{PipelineError, Result};

/// Build the prompt for one step over one work unit.
///
/// Every prompt ends with the embedded-JSON instruction so the response
/// can be parsed for a verdict and findings; the custom type substitutes
/// `{{unit.*}}` placeholders into the user-supplied template instead of
/// using a built-in section layout.
pub fn build_prompt(unit: &WorkUnit, config: &StepConfig) -> Result<String> {
    let mut prompt = String::new();

    match config.step_type {
        StepType::Custom => {
            let template = config.template.as_ref().ok_or_else(|| {
                PipelineError::InvalidConfig("custom step requires a template".to_string())
            })?;
            prompt.push_str(&substitute_placeholders(template, unit));
        }
        step_type => {
            prompt.push_str(header(step_type));
            prompt.push_str("\n\n");
            push_unit_section(&mut prompt, unit);
            push_type_section(&mut prompt, config);
        }
    }

    push_memory_section(&mut prompt, config);
    prompt.push_str("\n\n");
    prompt.push_str(json_instruction(config.step_type));
    Ok(prompt)
}

fn header(step_type: StepType) -> &'static str {
    match step_type {
        StepType::Review => {
            "Review the implementation of the following work unit for correctness, \
             readability and maintainability."
        }
        StepType::Security => {
            "Audit the implementation of the following work unit for security \
             vulnerabilities."
        }
        StepType::Performance => {
            "Analyze the implementation of the following work unit for performance \
             problems."
        }
        StepType::Test => {
            "Assess the test coverage and test quality for the following work unit."
        }
        StepType::Custom => unreachable!("custom steps use the template path"),
    }
}

fn substitute_placeholders(template: &str, unit: &WorkUnit) -> String {
    template
        .replace("{{unit.title}}", &unit.title)
        .replace("{{unit.description}}", &unit.description)
        .replace("{{unit.category}}", &unit.category)
        .replace("{{unit.id}}", &unit.id.to_string())
}

fn push_unit_section(prompt: &mut String, unit: &WorkUnit) {
    prompt.push_str(&format!(
        "Work unit: {}\nCategory: {}\nDescription: {}\n",
        unit.title, unit.category, unit.description
    ));
}

fn push_type_section(prompt: &mut String, config: &StepConfig) {
    if !config.focus_areas.is_empty() {
        prompt.push_str("\nFocus on:\n");
        for area in &config.focus_areas {
            prompt.push_str(&format!("- {}\n", area));
        }
    }
    if !config.checklist.is_empty() {
        prompt.push_str("\nVerify each of the following:\n");
        for item in &config.checklist {
            prompt.push_str(&format!("- {}\n", item));
        }
    }
    if !config.thresholds.is_empty() {
        prompt.push_str("\nFlag anything exceeding these thresholds:\n");
        for (name, value) in &config.thresholds {
            prompt.push_str(&format!("- {}: {}\n", name, value));
        }
    }
    if let Some(target) = config.coverage_target {
        prompt.push_str(&format!(
            "\nThe minimum acceptable line coverage is {}%.\n",
            target
        ));
    }
}

fn push_memory_section(prompt: &mut String, config: &StepConfig) {
    if config.memory.is_empty() {
        return;
    }
    prompt.push_str(
        "\nThe following issues were already reported in earlier iterations. \
         Do not repeat them; report only new issues:\n",
    );
    for finding in &config.memory {
        match &finding.location {
            Some(location) => {
                prompt.push_str(&format!("- {} ({})\n", finding.summary, location))
            }
            None => prompt.push_str(&format!("- {}\n", finding.summary)),
        }
    }
}

fn json_instruction(step_type: StepType) -> &'static str {
    match step_type {
        StepType::Performance => {
            "Respond with exactly one JSON object (prose around it is fine) with fields: \
             \"summary\" (string), \"issues\" (array of objects with \"summary\", \"file\", \
             \"line\", \"category\", \"severity\"), \"metrics\" (object of measured values) \
             and \"optimizations\" (array of strings)."
        }
        StepType::Test => {
            "Respond with exactly one JSON object (prose around it is fine) with fields: \
             \"summary\" (string), \"issues\" (array of objects with \"summary\", \"file\", \
             \"line\", \"category\", \"severity\"), \"coverage\" (number) and \
             \"suggestions\" (array of strings)."
        }
        _ => {
            "Respond with exactly one JSON object (prose around it is fine) with fields: \
             \"summary\" (string), \"issues\" (array of objects with \"summary\", \"file\", \
             \"line\", \"category\", \"severity\") and \"suggestions\" (array of strings)."
        }
    }
}
