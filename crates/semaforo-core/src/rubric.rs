/// Scoring rubric: single source of truth for the scoring prompt and the MCP instructions.
pub const RUBRIC: &str = "\
1. Three outcomes only. Every submission is classified as \"verde\" (low risk), \"amarillo\" \
(moderate risk) or \"rojo\" (high risk). Never invent other colors or intermediate grades.\n\
2. Judge the client's situation, not the quality of their writing. Short or informal answers \
are normal; do not penalize spelling, tone or brevity.\n\
3. \"rojo\" means the client needs action now: no emergency savings combined with debt they \
cannot service, income that does not cover fixed expenses, or exposure to products they \
explicitly say they do not understand.\n\
4. \"amarillo\" means the situation is stable but has clear gaps: savings below three months \
of expenses, concentrated investments, missing insurance for dependants, or debt that is \
serviceable but growing.\n\
5. \"verde\" means the client covers expenses, holds an emergency fund, keeps debt under \
control and understands the products they hold.\n\
6. When answers contradict each other or are too sparse to decide, choose \"amarillo\". Never \
choose \"verde\" because information is missing.\n\
7. The summary is addressed to the client, in Spanish, in at most three sentences. Name the \
one or two factors that drove the classification and one concrete next step. Do not give \
product recommendations or mention specific financial institutions.\n\
8. Advisers review every result. Do not claim the assessment is final or binding.";
