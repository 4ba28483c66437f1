use std::path::Path;

use crate::config::WorkflowConfig;

pub const GENERATE_SYSTEM: &str = "You are a data visualization expert. \
     You write chart scripts in a small pipeline language and nothing else. \
     Return exactly one script block.";

pub const REFLECT_SYSTEM: &str = "You are a meticulous chart reviewer. \
     You look at a rendered chart and the script that produced it, say what is wrong \
     or missing, and return an improved script. Answer with a single JSON object.";

/// Reference for the chart language, embedded in both prompts.
pub const LANGUAGE_GUIDE: &str = r#"Chart script language (one statement per line, `#` starts a comment):
  let <name> = <expr>            bind a table or series
  chart bar|line|scatter         chart type (default bar)
  size <width> <height>          canvas size in pixels
  title "<text>"                 chart title
  xlabel "<text>" / ylabel "<text>"
  series "<label>" <expr>        add a series; <expr> must produce a series
  legend [on|off]                show a legend
  save "<path>"                  render the chart to <path>

Expressions start from a binding (`df` is the dataset) followed by `| op` steps:
  where <col> ==|!=|<|<=|>|>= <number|"text">   filter rows
  select <col>, <col>                           keep columns
  head <n>                                      first n rows / points
  sum|mean|min|max <col> by <col>               aggregate into a series
  count by <col>                                row counts as a series
  xy <xcol> <ycol>                              one point per row
  sort asc|desc|keys                            order a series
Quote column names that contain spaces."#;

pub fn generation_prompt(
    instruction: &str,
    schema: &str,
    out_path: &Path,
    config: &WorkflowConfig,
) -> String {
    format!(
        "{LANGUAGE_GUIDE}\n\n\
         Dataset `df`:\n{schema}\n\
         Instruction: {instruction}\n\n\
         Write a script that fulfils the instruction and ends with:\n  save \"{path}\"\n\n\
         Return the script wrapped exactly like this:\n{start}\n<script>\n{end}\n",
        path = out_path.display(),
        start = config.block_start,
        end = config.block_end,
    )
}

pub fn reflection_prompt(
    instruction: &str,
    previous: &str,
    schema: &str,
    out_path: &Path,
    config: &WorkflowConfig,
) -> String {
    format!(
        "{LANGUAGE_GUIDE}\n\n\
         Dataset `df`:\n{schema}\n\
         Original instruction: {instruction}\n\n\
         The attached image was produced by this response:\n{previous}\n\n\
         Critique the chart: readability, labels, legend, chart type, and whether it answers \
         the instruction. Then write an improved script that ends with:\n  save \"{path}\"\n\n\
         Respond with JSON only:\n\
         {{\"feedback\": \"<short critique>\", \"refined_code\": \"{start}\\n<script>\\n{end}\"}}\n",
        path = out_path.display(),
        start = config.block_start,
        end = config.block_end,
    )
}
