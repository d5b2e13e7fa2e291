//! Built-in expert profiles
//!
//! Each profile is the role text plus forward and backward task templates.
//! Templates use `{problem}`, `{code_template}`, `{comments}`, `{previous}` and
//! `{feedback}` placeholders, filled by [`super::PromptedExpert`].

/// Static description of one built-in expert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpertProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub role: &'static str,
    pub forward_task: &'static str,
    /// Experts without one restate their last contribution on reflection
    pub backward_task: Option<&'static str>,
}

const SHARED_CONTEXT: &str = "The problem is:\n{problem}\n\nComments from other experts so far:\n{comments}";

pub const CATALOG: [ExpertProfile; 7] = [
    ExpertProfile {
        id: "terminology_interpreter",
        name: "Terminology Interpreter",
        description: "Explains domain-specific terms in the problem and maps them to optimization concepts.",
        role: "You are a terminology interpreter. You have broad knowledge of operations research \
               vocabulary and of the industries optimization problems come from.",
        forward_task: "Identify the domain terms in the problem that a modeler could misread and give a \
                       short, precise interpretation of each, phrased in optimization language \
                       (sets, parameters, decision variables, objective, constraints).\n\n{shared}",
        backward_task: None,
    },
    ExpertProfile {
        id: "parameter_extractor",
        name: "Parameter Extractor",
        description: "Lists every numeric parameter and index set stated in the problem, with units.",
        role: "You are a parameter extraction specialist. You read problem statements closely and never \
               invent data that is not stated.",
        forward_task: "Extract every parameter of the problem: name, symbol, value and unit. Group them by \
                       index set and flag anything implied but not stated.\n\n{shared}",
        backward_task: Some(
            "Your earlier extraction was:\n{previous}\n\nThe program built from the team's work was \
             checked against reference cases:\n{feedback}\n\nRe-read the problem and correct any \
             parameter that could explain these failures. Restate the full corrected list.\n\n{shared}",
        ),
    },
    ExpertProfile {
        id: "modeling_knowledge_supplement_expert",
        name: "Modeling Knowledge Supplement Expert",
        description: "Supplies modeling techniques relevant to the problem, such as linearization or big-M constraints.",
        role: "You are a mathematical programming expert who supplements a team with modeling knowledge: \
               standard formulations, linearization tricks and integrality considerations.",
        forward_task: "Point out which standard formulations and modeling techniques apply to this problem \
                       and any pitfalls in applying them.\n\n{shared}",
        backward_task: None,
    },
    ExpertProfile {
        id: "modeling_expert",
        name: "Modeling Expert",
        description: "Builds the mathematical model: decision variables, objective and constraints.",
        role: "You are an operations research modeling expert. You write complete and correct \
               mathematical programming models.",
        forward_task: "Write the full mathematical model of the problem: decision variables with domains, \
                       the objective function and every constraint. Use the other experts' comments where \
                       they help.\n\n{shared}",
        backward_task: Some(
            "Your earlier model was:\n{previous}\n\nThe program implementing the team's model was checked \
             against reference cases:\n{feedback}\n\nFind the modeling error that explains the failures \
             and write the corrected model in full.\n\n{shared}",
        ),
    },
    ExpertProfile {
        id: "programming_example_provider",
        name: "Programming Example Provider",
        description: "Provides short solver code examples relevant to the model's structure.",
        role: "You are a Python programmer who knows optimization libraries such as Gurobi, PuLP and \
               SciPy, and keeps a stock of small, correct example programs.",
        forward_task: "Give a short Python example showing how a model with this structure is expressed \
                       and solved with a common library. Keep it minimal and runnable.\n\n{shared}",
        backward_task: None,
    },
    ExpertProfile {
        id: "programming_expert",
        name: "Programming Expert",
        description: "Writes the Python program that solves the model and returns the objective value.",
        role: "You are a Python programmer in the field of operations research and optimization, \
               proficient with Gurobi, PuLP, NumPy and SciPy.",
        forward_task: "Write a Python program that solves the problem, following the starter code \
                       below. The solving function must return the optimal objective value.\n\n\
                       Starter code:\n{code_template}\n\n{shared}",
        backward_task: Some(
            "Your earlier program was:\n{previous}\n\nIt was run against reference cases:\n{feedback}\n\n\
             Fix the program so every case passes. Keep the function signature from the starter code:\n\
             {code_template}\n\n{shared}",
        ),
    },
    ExpertProfile {
        id: "code_reviewer",
        name: "Code Reviewer",
        description: "Reviews proposed code for bugs and mismatches with the model.",
        role: "You are a meticulous code reviewer for optimization programs. You check code against the \
               mathematical model line by line.",
        forward_task: "Review the most recent code in the comments. List concrete bugs, constraint or \
                       objective mismatches, and library misuse, each with a fix.\n\n{shared}",
        backward_task: Some(
            "Your earlier review was:\n{previous}\n\nThe final program still failed reference cases:\n\
             {feedback}\n\nExplain what the review missed and what must change.\n\n{shared}",
        ),
    },
];

/// Expand a task template with the shared problem context
pub fn expand(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.replace("{shared}", SHARED_CONTEXT);
    for (key, value) in values {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let mut ids: Vec<_> = CATALOG.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn test_every_task_includes_shared_context() {
        for profile in CATALOG.iter() {
            assert!(profile.forward_task.contains("{shared}"), "{}", profile.id);
            if let Some(backward) = profile.backward_task {
                assert!(backward.contains("{feedback}"), "{}", profile.id);
            }
        }
    }

    #[test]
    fn test_expand_fills_placeholders() {
        let text = expand(
            "Task.\n{shared}",
            &[("problem", "maximize x"), ("comments", "(none)")],
        );
        assert_eq!(
            text,
            "Task.\nThe problem is:\nmaximize x\n\nComments from other experts so far:\n(none)"
        );
    }
}
