mod fixtures;
mod test_authentication;
mod test_execute_query;
