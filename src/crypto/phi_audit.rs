// Source scan: no tracing call anywhere under src/ may name a patient
// column, a contact detail or a credential. Logs carry ids and counts only.
