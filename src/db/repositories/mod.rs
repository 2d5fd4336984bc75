mod apartments;
mod votes;
